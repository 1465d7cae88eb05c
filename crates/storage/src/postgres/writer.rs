//! Transactional block writer for PostgreSQL.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use tracing::trace;

use tensorscan_core::error::{StorageError, StorageResult};
use tensorscan_core::models::{Block, Call, CallDescriptor, Extrinsic};
use tensorscan_core::ports::BlockWriter;

use super::call_repo::CallRow;
use super::helpers::query_error;

/// One database transaction holding all writes for a block.
///
/// sqlx rolls the transaction back when it is dropped uncommitted.
pub struct PgBlockWriter {
    tx: Transaction<'static, Postgres>,
}

impl PgBlockWriter {
    pub(crate) fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl BlockWriter for PgBlockWriter {
    async fn insert_block(&mut self, block: &Block) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO blocks (
                number, hash, parent_hash, state_root, extrinsics_root,
                timestamp, extrinsic_count, event_count, indexed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(block.number as i64)
        .bind(&block.hash.0[..])
        .bind(&block.parent_hash.0[..])
        .bind(&block.state_root.0[..])
        .bind(&block.extrinsics_root.0[..])
        .bind(block.timestamp)
        .bind(block.extrinsic_count as i32)
        .bind(block.event_count as i32)
        .bind(block.indexed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn insert_call(&mut self, call: &CallDescriptor) -> StorageResult<Option<Call>> {
        let row = sqlx::query_as::<_, CallRow>(
            r#"
            INSERT INTO calls (call_index, call_function, call_module)
            VALUES ($1, $2, $3)
            ON CONFLICT (call_index) DO NOTHING
            RETURNING call_index, call_function, call_module
            "#,
        )
        .bind(&call.call_index)
        .bind(&call.function)
        .bind(&call.module)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(query_error)?;

        if row.is_none() {
            trace!(call = %call.call_index, "Call insert hit existing row");
        }

        Ok(row.map(Call::from))
    }

    async fn find_call(&mut self, call_index: &str) -> StorageResult<Option<Call>> {
        let row = sqlx::query_as::<_, CallRow>(
            "SELECT call_index, call_function, call_module FROM calls WHERE call_index = $1",
        )
        .bind(call_index)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(query_error)?;

        Ok(row.map(Call::from))
    }

    async fn insert_extrinsic(&mut self, ext: &Extrinsic) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO extrinsics (
                id, hash, netuid, address, block_number, index, signature,
                tip, nonce, era, call_index, call_args, result, events
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8::NUMERIC, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(&ext.id)
        .bind(&ext.hash.0[..])
        .bind(ext.netuid)
        .bind(&ext.address)
        .bind(ext.block_number as i64)
        .bind(ext.index as i32)
        .bind(&ext.signature)
        .bind(ext.tip.map(|t| t.to_string()))
        .bind(ext.nonce.map(|n| n as i64))
        .bind(&ext.era)
        .bind(&ext.call_index)
        .bind(&ext.call_args)
        .bind(ext.result.as_str())
        .bind(Json(&ext.events))
        .execute(&mut *self.tx)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))
    }
}
