//! Block ingestion service - orchestrates fetch, analysis and persistence
//! of a single block.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, trace};

use crate::error::{ChainError, DomainError, IndexerError, IndexerResult, StorageError};
use crate::metrics::{ProcessingTimer, record_block_ingested, record_extrinsics_ingested};
use crate::models::{Block, BlockHash, Call, Extrinsic, ExtrinsicResult};
use crate::ports::{ChainClient, RawBlock, RawEvent, RawExtrinsic, Repositories};

use super::analyzer::{EventIndex, ExtrinsicAnalysis, analyze};
use super::call_registry::CallRegistry;
use super::timestamp::extract_timestamp;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the ingestion service.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Upper bound for each chain round trip (block, then events).
    pub fetch_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(60),
        }
    }
}

/// Summary of one ingested block.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub block_number: u64,
    pub block_hash: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub extrinsics: u32,
    pub failed_extrinsics: u32,
    pub events: u32,
    pub calls_created: u32,
    pub calls_reused: u32,
}

// =============================================================================
// IngestService
// =============================================================================

/// Ingests one block at a time into the store passed to each call.
///
/// # Flow
///
/// 1. Fetch the block and its events (read-only, bounded by the timeout)
/// 2. Extract the block timestamp
/// 3. Persist the block row
/// 4. Analyze every extrinsic and resolve the distinct calls in identifier order
/// 5. Persist each extrinsic with its call reference
/// 6. Commit
///
/// Steps 3 to 6 share one unit of work; any failure in them leaves the
/// store untouched.
pub struct IngestService<C: ChainClient> {
    config: IngestConfig,
    chain: Arc<C>,
}

impl<C: ChainClient> IngestService<C> {
    pub fn new(config: IngestConfig, chain: Arc<C>) -> Self {
        Self { config, chain }
    }

    /// Ingest block `block_number` into `store`.
    ///
    /// Fails with [`IndexerError::AlreadyIngested`] when the block number or
    /// hash is already stored.
    #[instrument(skip(self, store))]
    pub async fn ingest_block(
        &self,
        store: &dyn Repositories,
        block_number: u64,
    ) -> IndexerResult<IngestReport> {
        info!("⛓️  Ingesting block");

        let (raw_block, events) = self.fetch(block_number).await?;
        let _timer = ProcessingTimer::new();

        let timestamp = extract_timestamp(&raw_block.extrinsics);
        let block = transform_block(&raw_block, &events, timestamp)?;
        debug!(
            hash = %block.hash,
            extrinsics = block.extrinsic_count,
            events = block.event_count,
            timestamp = ?block.timestamp,
            "Block fetched"
        );

        let mut writer = store.begin().await?;
        writer
            .insert_block(&block)
            .await
            .map_err(|e| block_conflict(block_number, e))?;

        let event_index = EventIndex::new(&events);
        let mut registry = CallRegistry::new();
        let mut failed = 0u32;

        let analyses = raw_block
            .extrinsics
            .iter()
            .enumerate()
            .map(|(position, raw_ext)| {
                let position = u32::try_from(position)
                    .map_err(|_| IndexerError::Internal("extrinsic position overflow".into()))?;
                Ok((position, raw_ext, analyze(raw_ext, position, &event_index)))
            })
            .collect::<IndexerResult<Vec<_>>>()?;

        // Call rows are locked in one global order so that concurrent
        // ingesters sharing call types cannot deadlock each other.
        registry
            .resolve_all(
                writer.as_mut(),
                analyses.iter().filter_map(|(_, _, analysis)| analysis.call.as_ref()),
            )
            .await?;

        for (position, raw_ext, analysis) in &analyses {
            let call = match &analysis.call {
                Some(descriptor) => Some(registry.resolve(writer.as_mut(), descriptor).await?),
                None => None,
            };

            let extrinsic = transform_extrinsic(&block, *position, raw_ext, analysis, call.as_ref());
            trace!(
                id = %extrinsic.id,
                result = %extrinsic.result,
                call = ?extrinsic.call_index,
                events = extrinsic.events.len(),
                "Persisting extrinsic"
            );
            if extrinsic.result == ExtrinsicResult::Failed {
                failed += 1;
            }

            writer
                .insert_extrinsic(&extrinsic)
                .await
                .map_err(|e| extrinsic_conflict(&extrinsic.id, e))?;
        }

        writer.commit().await?;

        let report = IngestReport {
            block_number,
            block_hash: block.hash.to_hex(),
            timestamp: block.timestamp,
            extrinsics: block.extrinsic_count,
            failed_extrinsics: failed,
            events: block.event_count,
            calls_created: registry.created(),
            calls_reused: registry.reused(),
        };

        record_block_ingested();
        record_extrinsics_ingested(
            ExtrinsicResult::Success.as_str(),
            u64::from(report.extrinsics - failed),
        );
        record_extrinsics_ingested(ExtrinsicResult::Failed.as_str(), u64::from(failed));
        info!(
            extrinsics = report.extrinsics,
            failed = report.failed_extrinsics,
            new_calls = report.calls_created,
            "✅ Block ingested"
        );

        Ok(report)
    }

    /// Fetch the block and its events, each bounded by the fetch timeout.
    async fn fetch(&self, block_number: u64) -> IndexerResult<(RawBlock, Vec<RawEvent>)> {
        let timeout = self.config.fetch_timeout;

        let raw_block = tokio::time::timeout(timeout, self.chain.fetch_block(block_number))
            .await
            .map_err(|_| ChainError::Timeout(block_number))??;

        if raw_block.number != block_number {
            return Err(DomainError::ValidationError(format!(
                "requested block {} but node returned {}",
                block_number, raw_block.number
            ))
            .into());
        }

        let hash = BlockHash(raw_block.hash);
        let events = tokio::time::timeout(timeout, self.chain.fetch_events(&hash))
            .await
            .map_err(|_| ChainError::Timeout(block_number))??;

        Ok((raw_block, events))
    }
}

// =============================================================================
// Transformation
// =============================================================================

fn transform_block(
    raw: &RawBlock,
    events: &[RawEvent],
    timestamp: Option<DateTime<Utc>>,
) -> IndexerResult<Block> {
    Ok(Block {
        number: raw.number,
        hash: BlockHash(raw.hash),
        parent_hash: BlockHash(raw.parent_hash),
        state_root: BlockHash(raw.state_root),
        extrinsics_root: BlockHash(raw.extrinsics_root),
        timestamp,
        extrinsic_count: count_u32(raw.extrinsics.len(), "extrinsic")?,
        event_count: count_u32(events.len(), "event")?,
        indexed_at: Utc::now(),
    })
}

fn count_u32(len: usize, what: &str) -> IndexerResult<u32> {
    u32::try_from(len).map_err(|_| IndexerError::Internal(format!("{what} count {len} exceeds u32")))
}

fn transform_extrinsic(
    block: &Block,
    position: u32,
    raw: &RawExtrinsic,
    analysis: &ExtrinsicAnalysis<'_>,
    call: Option<&Call>,
) -> Extrinsic {
    Extrinsic {
        id: Extrinsic::position_id(block.number, position),
        hash: raw.hash.clone(),
        netuid: analysis.netuid,
        address: raw.address.clone(),
        block_number: block.number,
        index: position,
        signature: raw.signature.clone(),
        tip: raw.tip,
        nonce: raw.nonce,
        era: raw.era.clone(),
        call_index: call.map(|c| c.call_index.clone()),
        call_args: raw
            .call
            .as_ref()
            .map(|c| c.args_json())
            .unwrap_or_else(|| serde_json::Value::Array(Vec::new())),
        result: ExtrinsicResult::from_success(analysis.success),
        events: analysis.events.iter().map(|e| e.to_json()).collect(),
    }
}

fn block_conflict(number: u64, err: StorageError) -> IndexerError {
    match err {
        StorageError::ConstraintViolation(message) => IndexerError::AlreadyIngested { number, message },
        other => other.into(),
    }
}

fn extrinsic_conflict(id: &str, err: StorageError) -> IndexerError {
    match err {
        StorageError::ConstraintViolation(message) => IndexerError::ExtrinsicConflict {
            id: id.to_string(),
            message,
        },
        other => other.into(),
    }
}

// =============================================================================
// Tests
// =============================================================================
