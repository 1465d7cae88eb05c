//! PostgreSQL storage adapter.
//!
//! This module implements the repository traits defined in `tensorscan-core`
//! using PostgreSQL as the backing store.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool and migrations
//! - [`PgRepositories`] - Composite repository implementing `Repositories` trait
//! - [`PgBlockWriter`] - One transaction per ingested block
//! - Read repos: `PgBlockRepository`, `PgCallRepository`, `PgExtrinsicRepository`
//!
//! # Usage
//!
//! ```ignore
//! let config = DatabaseConfig::for_ingest(&database_url);
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let repositories = PgRepositories::new(Arc::new(db));
//! ```

mod block_repo;
mod call_repo;
mod database;
mod extrinsic_repo;
mod helpers;
mod writer;

pub use block_repo::PgBlockRepository;
pub use call_repo::PgCallRepository;
pub use database::{DEFAULT_DATABASE_URL, Database, DatabaseConfig};
pub use extrinsic_repo::PgExtrinsicRepository;
pub use writer::PgBlockWriter;

use std::sync::Arc;

use async_trait::async_trait;

use tensorscan_core::error::{StorageError, StorageResult};
use tensorscan_core::ports::{
    BlockRepository, BlockWriter, CallRepository, ExtrinsicRepository, Repositories,
};

// =============================================================================
// Composite Repository
// =============================================================================

/// Aggregated PostgreSQL repositories implementing the `Repositories` trait.
pub struct PgRepositories {
    db: Arc<Database>,
    blocks: PgBlockRepository,
    calls: PgCallRepository,
    extrinsics: PgExtrinsicRepository,
}

impl PgRepositories {
    /// Create a new repository aggregate from a database connection.
    pub fn new(db: Arc<Database>) -> Self {
        let pool = db.pool().clone();
        Self {
            blocks: PgBlockRepository::new(&db),
            calls: PgCallRepository::new(pool.clone()),
            extrinsics: PgExtrinsicRepository::new(pool),
            db,
        }
    }
}

#[async_trait]
impl Repositories for PgRepositories {
    fn blocks(&self) -> &dyn BlockRepository {
        &self.blocks
    }

    fn calls(&self) -> &dyn CallRepository {
        &self.calls
    }

    fn extrinsics(&self) -> &dyn ExtrinsicRepository {
        &self.extrinsics
    }

    async fn begin(&self) -> StorageResult<Box<dyn BlockWriter>> {
        let tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        Ok(Box::new(PgBlockWriter::new(tx)))
    }
}
