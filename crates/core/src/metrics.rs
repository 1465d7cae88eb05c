//! Metrics definitions for the ingestion pipeline.
//!
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`. Without an installed
//! recorder every call here is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "decode_errors_total",
        "Total number of decode anomalies absorbed during ingestion"
    );
    describe_counter!(
        "blocks_ingested_total",
        "Total number of blocks successfully ingested"
    );
    describe_counter!(
        "extrinsics_ingested_total",
        "Total number of extrinsics persisted, labelled by result"
    );
    describe_counter!(
        "calls_created_total",
        "Total number of call types created in the call registry"
    );
    describe_counter!(
        "call_conflicts_total",
        "Total number of call inserts reconciled against an existing row"
    );
    describe_histogram!(
        "block_ingest_duration_seconds",
        "Time taken to ingest a block in seconds"
    );
}

/// Record a decode anomaly.
///
/// # Arguments
/// * `kind` - What failed to decode ("extrinsic", "event", "timestamp", "netuid")
/// * `module` - The pallet name (if known)
pub fn record_decode_error(kind: &str, module: &str) {
    counter!("decode_errors_total", "kind" => kind.to_string(), "module" => module.to_string())
        .increment(1);
}

/// Record a successfully ingested block.
pub fn record_block_ingested() {
    counter!("blocks_ingested_total").increment(1);
}

/// Record persisted extrinsics for one result label.
pub fn record_extrinsics_ingested(result: &'static str, count: u64) {
    counter!("extrinsics_ingested_total", "result" => result).increment(count);
}

/// Record a newly created call row.
pub fn record_call_created() {
    counter!("calls_created_total").increment(1);
}

/// Record a call insert that lost to an existing row.
pub fn record_call_conflict() {
    counter!("call_conflicts_total").increment(1);
}

/// Record block ingestion duration.
pub fn record_block_ingest_duration(duration_secs: f64) {
    histogram!("block_ingest_duration_seconds").record(duration_secs);
}

/// A timer that automatically records duration when dropped.
pub struct ProcessingTimer {
    start: Instant,
}

impl ProcessingTimer {
    /// Start a new processing timer.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for ProcessingTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessingTimer {
    fn drop(&mut self) {
        record_block_ingest_duration(self.start.elapsed().as_secs_f64());
    }
}
