//! Core business logic services.

mod analyzer;
mod call_registry;
mod ingest;
mod timestamp;

pub use analyzer::{
    EXTRINSIC_SUCCESS, EventIndex, ExtrinsicAnalysis, NETUID_ARG, analyze, call_descriptor,
    extract_netuid, is_success,
};
pub use call_registry::CallRegistry;
pub use ingest::{IngestConfig, IngestReport, IngestService};
pub use timestamp::{TIMESTAMP_FUNCTION, TIMESTAMP_MODULE, extract_timestamp};
