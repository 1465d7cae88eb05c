//! Core domain layer for the tensorscan block ingester.
//!
//! This crate contains the domain models, port traits (interfaces), and
//! ingestion services. It follows hexagonal architecture principles: this
//! is the innermost layer with no dependencies on infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    tensorscan (binary)                      │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │     tensorscan-storage       │     tensorscan-substrate     │
//! │       (PostgreSQL)           │           (RPC)              │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │                 tensorscan-core  ← YOU ARE HERE             │
//! │           (models, ports, services, memory store)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Domain models (Block, Call, Extrinsic)
//! - [`ports`] - Interface traits for adapters to implement
//! - [`services`] - Ingestion logic ([`services::IngestService`])
//! - [`memory`] - In-process store for dry runs and tests
//! - [`error`] - Domain error types
//! - [`metrics`] - Metrics definitions
//!
//! # Ingestion
//!
//! 1. Fetch one block and its events through [`ports::ChainClient`]
//! 2. Take the block timestamp from the first `Timestamp.set` call
//! 3. Persist the block through a [`ports::BlockWriter`]
//! 4. Per extrinsic: correlate events, derive the result, register the
//!    call type, persist the extrinsic
//! 5. Commit

pub mod error;
pub mod memory;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod services;
