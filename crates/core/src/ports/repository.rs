//! Port traits for data repositories.
//!
//! These traits define the storage interface used by the domain layer.
//! Implementations live in the infrastructure layer (e.g.,
//! `tensorscan-storage`) or in [`crate::memory`].
//!
//! Reads go through the per-entity repositories. All writes of one block go
//! through a single [`BlockWriter`] unit of work so they commit or roll back
//! together.

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::models::{Block, BlockHash, Call, CallDescriptor, Extrinsic};

// =============================================================================
// Repository Traits
// =============================================================================

/// Read access to stored blocks.
#[async_trait]
pub trait BlockRepository: Send + Sync {
    /// Get block by number.
    async fn get_block(&self, number: u64) -> StorageResult<Option<Block>>;

    /// Get block by hash.
    async fn get_block_by_hash(&self, hash: &BlockHash) -> StorageResult<Option<Block>>;
}

/// Read access to the call registry table.
#[async_trait]
pub trait CallRepository: Send + Sync {
    /// Get call by identifier.
    async fn get_call(&self, call_index: &str) -> StorageResult<Option<Call>>;

    /// List all known calls ordered by identifier.
    async fn list_calls(&self) -> StorageResult<Vec<Call>>;
}

/// Read access to stored extrinsics.
#[async_trait]
pub trait ExtrinsicRepository: Send + Sync {
    /// Get extrinsic by position identifier.
    async fn get_extrinsic(&self, id: &str) -> StorageResult<Option<Extrinsic>>;

    /// List extrinsics for a block, ordered by index.
    async fn list_extrinsics_for_block(&self, block_number: u64) -> StorageResult<Vec<Extrinsic>>;
}

// =============================================================================
// Unit of Work
// =============================================================================

/// Write transaction for one block.
///
/// Uniqueness violations surface as
/// [`StorageError::ConstraintViolation`](crate::error::StorageError::ConstraintViolation).
/// Dropping a writer without calling [`commit`](BlockWriter::commit) discards
/// every write made through it.
#[async_trait]
pub trait BlockWriter: Send {
    /// Insert the block row. Fails on a duplicate number or hash.
    async fn insert_block(&mut self, block: &Block) -> StorageResult<()>;

    /// Insert a call row unless its identifier exists.
    ///
    /// Returns the inserted row, or `None` when another writer already owns
    /// the identifier. Never checks existence before inserting.
    async fn insert_call(&mut self, call: &CallDescriptor) -> StorageResult<Option<Call>>;

    /// Fetch a call row visible to this writer.
    async fn find_call(&mut self, call_index: &str) -> StorageResult<Option<Call>>;

    /// Insert an extrinsic row. Fails on a duplicate hash or position id.
    async fn insert_extrinsic(&mut self, extrinsic: &Extrinsic) -> StorageResult<()>;

    /// Make every write of this unit visible.
    async fn commit(self: Box<Self>) -> StorageResult<()>;
}

// =============================================================================
// Composite Repository
// =============================================================================

/// Combined repository access for the ingestion service.
#[async_trait]
pub trait Repositories: Send + Sync {
    /// Access the block repository.
    fn blocks(&self) -> &dyn BlockRepository;

    /// Access the call repository.
    fn calls(&self) -> &dyn CallRepository;

    /// Access the extrinsic repository.
    fn extrinsics(&self) -> &dyn ExtrinsicRepository;

    /// Open a write unit of work for one block.
    async fn begin(&self) -> StorageResult<Box<dyn BlockWriter>>;
}
