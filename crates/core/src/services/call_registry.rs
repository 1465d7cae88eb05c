//! Call type registry backed by the `calls` table.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, instrument, trace};

use crate::error::{StorageError, StorageResult};
use crate::metrics::{record_call_conflict, record_call_created};
use crate::models::{Call, CallDescriptor};
use crate::ports::BlockWriter;

/// Resolves call descriptors to persisted [`Call`] rows.
///
/// Resolution inserts first and, when the identifier is already owned by
/// another row, fetches and returns that row. Concurrent ingesters of
/// different blocks therefore converge on a single row per identifier
/// without any read-before-write.
///
/// A registry lives for one ingestion run; its memo only holds rows written
/// or read through the same writer.
#[derive(Debug, Default)]
pub struct CallRegistry {
    resolved: HashMap<String, Call>,
    created: u32,
    reused: u32,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the row for `descriptor`, creating it if needed.
    #[instrument(skip_all, fields(call = %descriptor.call_index))]
    pub async fn resolve(
        &mut self,
        writer: &mut dyn BlockWriter,
        descriptor: &CallDescriptor,
    ) -> StorageResult<Call> {
        if let Some(call) = self.resolved.get(&descriptor.call_index) {
            trace!("Call already resolved in this run");
            return Ok(call.clone());
        }

        let call = match writer.insert_call(descriptor).await? {
            Some(created) => {
                debug!(
                    module = ?created.module,
                    function = ?created.function,
                    "🆕 New call type registered"
                );
                record_call_created();
                self.created += 1;
                created
            }
            None => {
                record_call_conflict();
                self.reused += 1;
                writer
                    .find_call(&descriptor.call_index)
                    .await?
                    .ok_or_else(|| {
                        StorageError::NotFound(format!(
                            "call {} conflicted on insert but is not visible",
                            descriptor.call_index
                        ))
                    })?
            }
        };

        self.resolved
            .insert(descriptor.call_index.clone(), call.clone());
        Ok(call)
    }

    /// Resolve every distinct descriptor in ascending identifier order.
    ///
    /// Each insert holds a row lock until commit, so writers that touch
    /// call rows in the same order never wait on each other in a cycle.
    pub async fn resolve_all<'d>(
        &mut self,
        writer: &mut dyn BlockWriter,
        descriptors: impl IntoIterator<Item = &'d CallDescriptor>,
    ) -> StorageResult<()> {
        let ordered: BTreeMap<&str, &CallDescriptor> = descriptors
            .into_iter()
            .map(|d| (d.call_index.as_str(), d))
            .collect();
        for descriptor in ordered.into_values() {
            self.resolve(writer, descriptor).await?;
        }
        Ok(())
    }

    /// Calls inserted by this registry.
    pub fn created(&self) -> u32 {
        self.created
    }

    /// Calls that already existed when first seen by this registry.
    pub fn reused(&self) -> u32 {
        self.reused
    }
}
