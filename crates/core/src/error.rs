//! Error types for the ingestion domain layer.
//!
//! - [`StorageError`] - raised by repository adapters
//! - [`ChainError`] - raised by chain client adapters
//! - [`DomainError`] - inconsistent data noticed by the services
//! - [`IndexerError`] - what [`crate::services::IngestService`] returns
//!
//! `From` conversions let `?` lift adapter errors into [`IndexerError`].

use thiserror::Error;

// =============================================================================
// Storage Errors
// =============================================================================

/// Repository errors.
///
/// Adapters report every uniqueness or foreign key violation as
/// [`StorageError::ConstraintViolation`]; the services rely on that to tell
/// "already stored" apart from infrastructure failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    #[error("Query execution error: {0}")]
    QueryError(String),

    /// A row expected to exist is not visible.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Unique or foreign key constraint violated.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    /// Opening or committing the write unit failed.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// A stored value cannot be mapped back to the model.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl StorageError {
    /// Whether this error is a uniqueness/constraint conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::ConstraintViolation(_))
    }
}

// =============================================================================
// Chain Errors
// =============================================================================

/// Chain client errors.
///
/// Fetching is read-only, so every variant is safe to retry for the
/// whole block.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    /// The node has no block at the requested height.
    #[error("Unknown block: {0}")]
    UnknownBlock(u64),

    #[error("Block fetch error at hash {hash}: {message}")]
    BlockFetchError { hash: String, message: String },

    /// The runtime metadata in force at a block could not be loaded.
    #[error("Metadata for spec version {spec_version} unusable: {message}")]
    Metadata { spec_version: u32, message: String },

    /// Event decoding stopped early, so later events are unknown.
    #[error("Only {decoded} of {expected} events decoded at {hash}: {message}")]
    IncompleteEvents {
        hash: String,
        decoded: u32,
        expected: u32,
        message: String,
    },

    /// A chain round trip exceeded the fetch timeout.
    #[error("Timeout waiting for block {0}")]
    Timeout(u64),
}

// =============================================================================
// Domain Errors
// =============================================================================

/// Chain data that contradicts what was requested or expected.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    ValidationError(String),
}

// =============================================================================
// Indexer Errors
// =============================================================================

/// Errors returned by [`crate::services::IngestService`].
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// The block number or hash is already stored.
    ///
    /// Re-ingestion is an operator error and is never merged silently.
    #[error("Block {number} already ingested: {message}")]
    AlreadyIngested { number: u64, message: String },

    /// An extrinsic hash or position identifier is already stored.
    #[error("Extrinsic {id} conflicts with a stored row: {message}")]
    ExtrinsicConflict { id: String, message: String },

    /// A block too large for the stored counters and positions.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

pub type IndexerResult<T> = Result<T, IndexerError>;

pub type StorageResult<T> = Result<T, StorageError>;

pub type ChainResult<T> = Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_errors_lift_into_indexer_error() {
        let indexer_err: IndexerError = StorageError::QueryError("db failed".into()).into();
        assert!(matches!(indexer_err, IndexerError::Storage(_)));
        assert!(indexer_err.to_string().contains("db failed"));

        let indexer_err: IndexerError = ChainError::RpcError("rpc failed".into()).into();
        assert!(matches!(indexer_err, IndexerError::Chain(_)));
        assert!(indexer_err.to_string().contains("rpc failed"));
    }

    #[test]
    fn already_ingested_names_block() {
        let err = IndexerError::AlreadyIngested {
            number: 3593992,
            message: "blocks_pkey".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("3593992") && msg.contains("blocks_pkey"));
    }

    #[test]
    fn only_constraint_violation_is_conflict() {
        assert!(StorageError::ConstraintViolation("calls_pkey".into()).is_conflict());
        assert!(!StorageError::QueryError("deadlock detected".into()).is_conflict());
    }

    #[test]
    fn incomplete_events_reports_counts() {
        let err = ChainError::IncompleteEvents {
            hash: "0xab".into(),
            decoded: 3,
            expected: 7,
            message: "unknown variant".into(),
        };
        assert!(err.to_string().contains("3 of 7"));
    }
}
