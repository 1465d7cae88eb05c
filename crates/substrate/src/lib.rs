//! Substrate RPC adapter for the tensorscan block ingester.
//!
//! This crate implements the [`ChainClient`] port from `tensorscan-core`,
//! fetching single historical blocks and their events from a Substrate
//! archive node over WebSocket RPC.
//!
//! # Features
//!
//! - Block lookup by height through the legacy RPC methods
//! - Decoding with the runtime metadata in force at each block, cached per
//!   spec version
//! - SCALE to JSON conversion for call arguments and event attributes
//! - Signer, signature, tip, nonce and era extraction from signed extrinsics
//!
//! # Usage
//!
//! ```ignore
//! use tensorscan_substrate::{SubstrateClient, SubstrateClientConfig};
//!
//! let config = SubstrateClientConfig {
//!     ws_url: "wss://archive.chain.opentensor.ai:443".to_string(),
//! };
//!
//! let client = SubstrateClient::connect(config).await?;
//! let block = client.fetch_block(3_593_992).await?;
//! let events = client.fetch_events(&BlockHash(block.hash)).await?;
//! ```
//!
//! Each extrinsic is decoded on its own: one that does not decode keeps its
//! position and hash and has no call. Events cannot be skipped that way, so a
//! block whose events do not all decode fails with
//! `ChainError::IncompleteEvents`.
//!
//! [`ChainClient`]: tensorscan_core::ports::ChainClient

mod client;

pub use client::{DEFAULT_CHAIN_ENDPOINT, SubstrateClient, SubstrateClientConfig};
