//! Block repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use tensorscan_core::error::StorageResult;
use tensorscan_core::models::{Block, BlockHash};
use tensorscan_core::ports::BlockRepository;

use super::database::Database;
use super::helpers::{bytes_to_hash32, bytes_to_hash32_strict, query_error};

pub(crate) const BLOCK_COLUMNS: &str = "number, hash, parent_hash, state_root, extrinsics_root, \
     timestamp, extrinsic_count, event_count, indexed_at";

/// PostgreSQL implementation of BlockRepository.
pub struct PgBlockRepository {
    pool: PgPool,
}

impl PgBlockRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl BlockRepository for PgBlockRepository {
    async fn get_block(&self, number: u64) -> StorageResult<Option<Block>> {
        let row = sqlx::query_as::<_, BlockRow>(&format!(
            "SELECT {} FROM blocks WHERE number = $1",
            BLOCK_COLUMNS
        ))
        .bind(number as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.map(BlockRow::into_block).transpose()
    }

    async fn get_block_by_hash(&self, hash: &BlockHash) -> StorageResult<Option<Block>> {
        let row = sqlx::query_as::<_, BlockRow>(&format!(
            "SELECT {} FROM blocks WHERE hash = $1",
            BLOCK_COLUMNS
        ))
        .bind(&hash.0[..])
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.map(BlockRow::into_block).transpose()
    }
}

/// Database row representation for Block.
#[derive(sqlx::FromRow)]
struct BlockRow {
    number: i64,
    hash: Vec<u8>,
    parent_hash: Vec<u8>,
    state_root: Vec<u8>,
    extrinsics_root: Vec<u8>,
    timestamp: Option<chrono::DateTime<chrono::Utc>>,
    extrinsic_count: i32,
    event_count: i32,
    indexed_at: chrono::DateTime<chrono::Utc>,
}

impl BlockRow {
    fn into_block(self) -> StorageResult<Block> {
        Ok(Block {
            number: self.number as u64,
            hash: BlockHash(bytes_to_hash32_strict(self.hash, "block.hash")?),
            // Zero for genesis.
            parent_hash: BlockHash(bytes_to_hash32(self.parent_hash, "block.parent_hash")?),
            state_root: BlockHash(bytes_to_hash32_strict(self.state_root, "block.state_root")?),
            extrinsics_root: BlockHash(bytes_to_hash32(
                self.extrinsics_root,
                "block.extrinsics_root",
            )?),
            timestamp: self.timestamp,
            extrinsic_count: self.extrinsic_count as u32,
            event_count: self.event_count as u32,
            indexed_at: self.indexed_at,
        })
    }
}
