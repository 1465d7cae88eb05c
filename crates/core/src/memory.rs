//! In-process [`Repositories`] implementation.
//!
//! Enforces the same uniqueness rules as the PostgreSQL schema (block number
//! and hash, call identifier, extrinsic hash and position id). Writes are
//! staged in the [`BlockWriter`] and applied on commit, so a dropped writer
//! leaves the store unchanged. A call identifier inserted by an open writer
//! is claimed until that writer commits or drops, the way an uncommitted
//! unique row blocks other inserts in PostgreSQL. Used for `--dry-run` and
//! tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::models::{Block, BlockHash, Call, CallDescriptor, Extrinsic};
use crate::ports::{
    BlockRepository, BlockWriter, CallRepository, ExtrinsicRepository, Repositories,
};

#[derive(Debug, Default, Clone)]
struct Tables {
    blocks: BTreeMap<u64, Block>,
    calls: BTreeMap<String, Call>,
    extrinsics: BTreeMap<String, Extrinsic>,
}

impl Tables {
    fn has_block_hash(&self, hash: &BlockHash) -> bool {
        self.blocks.values().any(|b| &b.hash == hash)
    }

    fn has_extrinsic_hash(&self, extrinsic: &Extrinsic) -> bool {
        self.extrinsics.values().any(|e| e.hash == extrinsic.hash)
    }
}

/// Committed rows plus call identifiers held by open writers.
#[derive(Debug, Default)]
struct Shared {
    tables: Tables,
    claims: BTreeMap<String, (u64, Call)>,
    next_writer: u64,
}

/// Shared in-memory store. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepositories {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a call row directly, as another ingester would have.
    pub fn seed_call(&self, call: Call) {
        lock(&self.shared)
            .tables
            .calls
            .insert(call.call_index.clone(), call);
    }

    /// Number of (blocks, calls, extrinsics) stored.
    pub fn counts(&self) -> (usize, usize, usize) {
        let shared = lock(&self.shared);
        let tables = &shared.tables;
        (
            tables.blocks.len(),
            tables.calls.len(),
            tables.extrinsics.len(),
        )
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    // Commits validate before mutating, so a poisoned lock is still consistent.
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn conflict(what: impl Into<String>) -> StorageError {
    StorageError::ConstraintViolation(what.into())
}

#[async_trait]
impl Repositories for MemoryRepositories {
    fn blocks(&self) -> &dyn BlockRepository {
        self
    }

    fn calls(&self) -> &dyn CallRepository {
        self
    }

    fn extrinsics(&self) -> &dyn ExtrinsicRepository {
        self
    }

    async fn begin(&self) -> StorageResult<Box<dyn BlockWriter>> {
        let id = {
            let mut shared = lock(&self.shared);
            shared.next_writer += 1;
            shared.next_writer
        };
        Ok(Box::new(MemoryBlockWriter {
            id,
            shared: self.shared.clone(),
            pending: Tables::default(),
        }))
    }
}

#[async_trait]
impl BlockRepository for MemoryRepositories {
    async fn get_block(&self, number: u64) -> StorageResult<Option<Block>> {
        Ok(lock(&self.shared).tables.blocks.get(&number).cloned())
    }

    async fn get_block_by_hash(&self, hash: &BlockHash) -> StorageResult<Option<Block>> {
        Ok(lock(&self.shared)
            .tables
            .blocks
            .values()
            .find(|b| &b.hash == hash)
            .cloned())
    }
}

#[async_trait]
impl CallRepository for MemoryRepositories {
    async fn get_call(&self, call_index: &str) -> StorageResult<Option<Call>> {
        Ok(lock(&self.shared).tables.calls.get(call_index).cloned())
    }

    async fn list_calls(&self) -> StorageResult<Vec<Call>> {
        Ok(lock(&self.shared).tables.calls.values().cloned().collect())
    }
}

#[async_trait]
impl ExtrinsicRepository for MemoryRepositories {
    async fn get_extrinsic(&self, id: &str) -> StorageResult<Option<Extrinsic>> {
        Ok(lock(&self.shared).tables.extrinsics.get(id).cloned())
    }

    async fn list_extrinsics_for_block(&self, block_number: u64) -> StorageResult<Vec<Extrinsic>> {
        let mut extrinsics: Vec<Extrinsic> = lock(&self.shared)
            .tables
            .extrinsics
            .values()
            .filter(|e| e.block_number == block_number)
            .cloned()
            .collect();
        extrinsics.sort_by_key(|e| e.index);
        Ok(extrinsics)
    }
}

/// Staged writes for one block.
struct MemoryBlockWriter {
    id: u64,
    shared: Arc<Mutex<Shared>>,
    pending: Tables,
}

impl Drop for MemoryBlockWriter {
    fn drop(&mut self) {
        let id = self.id;
        lock(&self.shared).claims.retain(|_, (owner, _)| *owner != id);
    }
}

#[async_trait]
impl BlockWriter for MemoryBlockWriter {
    async fn insert_block(&mut self, block: &Block) -> StorageResult<()> {
        let shared = lock(&self.shared);
        let tables = &shared.tables;
        if tables.blocks.contains_key(&block.number) || self.pending.blocks.contains_key(&block.number)
        {
            return Err(conflict(format!("blocks.number = {}", block.number)));
        }
        if tables.has_block_hash(&block.hash) || self.pending.has_block_hash(&block.hash) {
            return Err(conflict(format!("blocks.hash = {}", block.hash)));
        }
        drop(shared);

        self.pending.blocks.insert(block.number, block.clone());
        Ok(())
    }

    async fn insert_call(&mut self, call: &CallDescriptor) -> StorageResult<Option<Call>> {
        if self.pending.calls.contains_key(&call.call_index) {
            return Ok(None);
        }
        let mut shared = lock(&self.shared);
        if shared.tables.calls.contains_key(&call.call_index)
            || shared.claims.contains_key(&call.call_index)
        {
            return Ok(None);
        }

        let row = Call::from(call);
        shared
            .claims
            .insert(row.call_index.clone(), (self.id, row.clone()));
        drop(shared);
        self.pending.calls.insert(row.call_index.clone(), row.clone());
        Ok(Some(row))
    }

    async fn find_call(&mut self, call_index: &str) -> StorageResult<Option<Call>> {
        if let Some(call) = self.pending.calls.get(call_index) {
            return Ok(Some(call.clone()));
        }
        let shared = lock(&self.shared);
        Ok(shared
            .tables
            .calls
            .get(call_index)
            .or_else(|| shared.claims.get(call_index).map(|(_, call)| call))
            .cloned())
    }

    async fn insert_extrinsic(&mut self, extrinsic: &Extrinsic) -> StorageResult<()> {
        let shared = lock(&self.shared);
        let tables = &shared.tables;
        if tables.extrinsics.contains_key(&extrinsic.id)
            || self.pending.extrinsics.contains_key(&extrinsic.id)
        {
            return Err(conflict(format!("extrinsics.idx = {}", extrinsic.id)));
        }
        if tables.has_extrinsic_hash(extrinsic) || self.pending.has_extrinsic_hash(extrinsic) {
            return Err(conflict(format!("extrinsics.hash = {}", extrinsic.hash)));
        }
        let block_known = tables.blocks.contains_key(&extrinsic.block_number)
            || self.pending.blocks.contains_key(&extrinsic.block_number);
        if !block_known {
            return Err(conflict(format!(
                "extrinsics.block_number = {} has no block",
                extrinsic.block_number
            )));
        }
        drop(shared);

        self.pending
            .extrinsics
            .insert(extrinsic.id.clone(), extrinsic.clone());
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> StorageResult<()> {
        let pending = std::mem::take(&mut self.pending);
        let mut shared = lock(&self.shared);
        let tables = &mut shared.tables;

        // Another writer may have committed since the staged checks ran.
        for block in pending.blocks.values() {
            if tables.blocks.contains_key(&block.number) || tables.has_block_hash(&block.hash) {
                return Err(conflict(format!("blocks.number = {}", block.number)));
            }
        }
        for extrinsic in pending.extrinsics.values() {
            if tables.extrinsics.contains_key(&extrinsic.id) || tables.has_extrinsic_hash(extrinsic) {
                return Err(conflict(format!("extrinsics.idx = {}", extrinsic.id)));
            }
        }

        tables.blocks.extend(pending.blocks);
        tables.calls.extend(pending.calls);
        tables.extrinsics.extend(pending.extrinsics);

        // Claims are released when the writer drops.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtrinsicHash, ExtrinsicResult};
    use chrono::Utc;

    fn block(number: u64, seed: u8) -> Block {
        Block {
            number,
            hash: BlockHash([seed; 32]),
            parent_hash: BlockHash([0; 32]),
            state_root: BlockHash([1; 32]),
            extrinsics_root: BlockHash([2; 32]),
            timestamp: None,
            extrinsic_count: 1,
            event_count: 0,
            indexed_at: Utc::now(),
        }
    }

    fn extrinsic(block_number: u64, index: u32, seed: u8) -> Extrinsic {
        Extrinsic {
            id: Extrinsic::position_id(block_number, index),
            hash: ExtrinsicHash([seed; 32]),
            netuid: None,
            address: None,
            block_number,
            index,
            signature: None,
            tip: None,
            nonce: None,
            era: None,
            call_index: None,
            call_args: serde_json::Value::Array(vec![]),
            result: ExtrinsicResult::Failed,
            events: vec![],
        }
    }

    fn descriptor(index: &str) -> CallDescriptor {
        CallDescriptor::new(index, None, None).unwrap()
    }

    #[tokio::test]
    async fn dropped_writer_rolls_back() {
        let store = MemoryRepositories::new();
        {
            let mut writer = store.begin().await.unwrap();
            writer.insert_block(&block(1, 1)).await.unwrap();
            writer.insert_extrinsic(&extrinsic(1, 0, 9)).await.unwrap();
        }
        assert_eq!(store.counts(), (0, 0, 0));
    }

    #[tokio::test]
    async fn duplicate_block_number_or_hash_is_rejected() {
        let store = MemoryRepositories::new();
        let mut writer = store.begin().await.unwrap();
        writer.insert_block(&block(1, 1)).await.unwrap();
        writer.commit().await.unwrap();

        let mut writer = store.begin().await.unwrap();
        let same_number = writer.insert_block(&block(1, 2)).await.unwrap_err();
        assert!(same_number.is_conflict());
        let same_hash = writer.insert_block(&block(2, 1)).await.unwrap_err();
        assert!(same_hash.is_conflict());
    }

    #[tokio::test]
    async fn extrinsic_needs_block_and_unique_hash() {
        let store = MemoryRepositories::new();
        let mut writer = store.begin().await.unwrap();
        assert!(writer.insert_extrinsic(&extrinsic(1, 0, 9)).await.is_err());

        writer.insert_block(&block(1, 1)).await.unwrap();
        writer.insert_extrinsic(&extrinsic(1, 0, 9)).await.unwrap();
        let dup_hash = writer.insert_extrinsic(&extrinsic(1, 1, 9)).await.unwrap_err();
        assert!(dup_hash.is_conflict());
    }

    #[tokio::test]
    async fn concurrent_writers_converge_on_one_call() {
        let store = MemoryRepositories::new();
        let mut a = store.begin().await.unwrap();
        let mut b = store.begin().await.unwrap();

        // Only the first insert creates the row; the other sees the claim.
        let created_a = a.insert_call(&descriptor("0x0702")).await.unwrap();
        let created_b = b.insert_call(&descriptor("0x0702")).await.unwrap();
        assert!(created_a.is_some());
        assert!(created_b.is_none());
        assert_eq!(b.find_call("0x0702").await.unwrap(), created_a);

        a.insert_block(&block(1, 1)).await.unwrap();
        b.insert_block(&block(2, 2)).await.unwrap();
        a.commit().await.unwrap();
        b.commit().await.unwrap();

        assert_eq!(store.calls().list_calls().await.unwrap().len(), 1);
        assert_eq!(store.counts(), (2, 1, 0));
    }

    #[tokio::test]
    async fn dropped_writer_releases_its_call_claim() {
        let store = MemoryRepositories::new();
        {
            let mut a = store.begin().await.unwrap();
            assert!(a.insert_call(&descriptor("0x0702")).await.unwrap().is_some());
        }

        let mut b = store.begin().await.unwrap();
        assert!(b.insert_call(&descriptor("0x0702")).await.unwrap().is_some());
        b.commit().await.unwrap();
        assert_eq!(store.counts(), (0, 1, 0));
    }

    #[tokio::test]
    async fn committed_call_makes_insert_report_conflict() {
        let store = MemoryRepositories::new();
        store.seed_call(Call::from(&descriptor("0x0200")));

        let mut writer = store.begin().await.unwrap();
        assert!(writer.insert_call(&descriptor("0x0200")).await.unwrap().is_none());
        assert!(writer.find_call("0x0200").await.unwrap().is_some());
    }
}
