//! Storage layer for the tensorscan block ingester.
//!
//! This crate provides PostgreSQL implementations of the repository traits
//! defined in `tensorscan-core`: connection pooling, migrations, reads, and
//! the per-block write transaction.
//!
//! # Usage
//!
//! ```ignore
//! use tensorscan_storage::{Database, DatabaseConfig, PgRepositories};
//!
//! let config = DatabaseConfig::for_ingest(&database_url);
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let repositories = PgRepositories::new(Arc::new(db));
//! ```

pub mod postgres;

pub use postgres::{DEFAULT_DATABASE_URL, Database, DatabaseConfig, PgRepositories};
