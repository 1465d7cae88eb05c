//! Call registry reads for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use tensorscan_core::error::StorageResult;
use tensorscan_core::models::Call;
use tensorscan_core::ports::CallRepository;

use super::helpers::query_error;

/// PostgreSQL implementation of CallRepository.
pub struct PgCallRepository {
    pool: PgPool,
}

impl PgCallRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallRepository for PgCallRepository {
    async fn get_call(&self, call_index: &str) -> StorageResult<Option<Call>> {
        let row = sqlx::query_as::<_, CallRow>(
            "SELECT call_index, call_function, call_module FROM calls WHERE call_index = $1",
        )
        .bind(call_index)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(row.map(Call::from))
    }

    async fn list_calls(&self) -> StorageResult<Vec<Call>> {
        let rows = sqlx::query_as::<_, CallRow>(
            "SELECT call_index, call_function, call_module FROM calls ORDER BY call_index ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(rows.into_iter().map(Call::from).collect())
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct CallRow {
    call_index: String,
    call_function: Option<String>,
    call_module: Option<String>,
}

impl From<CallRow> for Call {
    fn from(row: CallRow) -> Self {
        Self {
            call_index: row.call_index,
            function: row.call_function,
            module: row.call_module,
        }
    }
}
