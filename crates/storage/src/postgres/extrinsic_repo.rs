//! Extrinsic repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;

use tensorscan_core::error::StorageResult;
use tensorscan_core::models::{Extrinsic, ExtrinsicHash, ExtrinsicResult};
use tensorscan_core::ports::ExtrinsicRepository;

use super::helpers::{bytes_to_hash32, parse_u128, query_error};

// NUMERIC has no native Rust mapping without extra features; read it as text.
const EXTRINSIC_COLUMNS: &str = "id, hash, netuid, address, block_number, index, signature, \
     tip::TEXT AS tip, nonce, era, call_index, call_args, result, events";

// =============================================================================
// Repository Implementation
// =============================================================================

/// PostgreSQL implementation of ExtrinsicRepository.
pub struct PgExtrinsicRepository {
    pool: PgPool,
}

impl PgExtrinsicRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExtrinsicRepository for PgExtrinsicRepository {
    async fn get_extrinsic(&self, id: &str) -> StorageResult<Option<Extrinsic>> {
        let row = sqlx::query_as::<_, ExtrinsicRow>(&format!(
            "SELECT {} FROM extrinsics WHERE id = $1",
            EXTRINSIC_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.map(ExtrinsicRow::into_extrinsic).transpose()
    }

    async fn list_extrinsics_for_block(&self, block_number: u64) -> StorageResult<Vec<Extrinsic>> {
        let rows = sqlx::query_as::<_, ExtrinsicRow>(&format!(
            "SELECT {} FROM extrinsics WHERE block_number = $1 ORDER BY index ASC",
            EXTRINSIC_COLUMNS
        ))
        .bind(block_number as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.into_iter()
            .map(ExtrinsicRow::into_extrinsic)
            .collect()
    }
}

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct ExtrinsicRow {
    id: String,
    hash: Vec<u8>,
    netuid: Option<i32>,
    address: Option<String>,
    block_number: i64,
    index: i32,
    signature: Option<serde_json::Value>,
    tip: Option<String>,
    nonce: Option<i64>,
    era: Option<String>,
    call_index: Option<String>,
    call_args: serde_json::Value,
    result: String,
    events: Json<Vec<serde_json::Value>>,
}

impl ExtrinsicRow {
    fn into_extrinsic(self) -> StorageResult<Extrinsic> {
        Ok(Extrinsic {
            hash: ExtrinsicHash(bytes_to_hash32(self.hash, "extrinsic.hash")?),
            tip: parse_u128(self.tip, "extrinsic.tip")?,
            id: self.id,
            netuid: self.netuid,
            address: self.address,
            block_number: self.block_number as u64,
            index: self.index as u32,
            signature: self.signature,
            nonce: self.nonce.map(|n| n as u64),
            era: self.era,
            call_index: self.call_index,
            call_args: self.call_args,
            result: ExtrinsicResult::from_db(&self.result)?,
            events: self.events.0,
        })
    }
}
