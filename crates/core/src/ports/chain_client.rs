//! Port trait for the blockchain data source.
//!
//! This trait defines the interface for fetching one block and its events
//! from a Substrate chain. Implementations live in the infrastructure layer
//! (e.g., `tensorscan-substrate`) and are responsible for turning whatever
//! the node returns into the typed raw structs below, so that the services
//! never have to guess at the shape of decoded chain data.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::ChainResult;
use crate::models::{BlockHash, ExtrinsicHash};

/// Raw block data from the chain before domain transformation.
#[derive(Debug, Clone)]
pub struct RawBlock {
    /// Block number.
    pub number: u64,
    /// Block hash.
    pub hash: [u8; 32],
    /// Parent hash.
    pub parent_hash: [u8; 32],
    /// State root.
    pub state_root: [u8; 32],
    /// Extrinsics root.
    pub extrinsics_root: [u8; 32],
    /// Decoded extrinsics, in block order.
    pub extrinsics: Vec<RawExtrinsic>,
}

/// Raw extrinsic data.
///
/// Every field the node may fail to provide is optional; an undecodable
/// call leaves `call` as `None` but the extrinsic itself is still present.
#[derive(Debug, Clone)]
pub struct RawExtrinsic {
    /// Index in block.
    pub index: u32,
    /// Extrinsic hash.
    pub hash: ExtrinsicHash,
    /// Sender address (if signed).
    pub address: Option<String>,
    /// Signature (if signed).
    pub signature: Option<Value>,
    /// Tip.
    pub tip: Option<u128>,
    /// Nonce.
    pub nonce: Option<u64>,
    /// Mortality era.
    pub era: Option<String>,
    /// Decoded call.
    pub call: Option<RawCall>,
}

/// Decoded call of an extrinsic.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCall {
    /// Hex call index, `0x<pallet index><call index>`.
    pub index: String,
    /// Pallet name.
    pub module: Option<String>,
    /// Call name.
    pub function: Option<String>,
    /// Arguments, in declaration order.
    pub args: Vec<CallArg>,
}

impl RawCall {
    /// Whether this is the call `module.function`.
    pub fn is(&self, module: &str, function: &str) -> bool {
        self.module.as_deref() == Some(module) && self.function.as_deref() == Some(function)
    }

    /// Arguments as the JSON list stored alongside the extrinsic.
    pub fn args_json(&self) -> Value {
        Value::Array(
            self.args
                .iter()
                .map(|arg| json!({ "name": arg.name, "value": arg.value }))
                .collect(),
        )
    }
}

/// One named call argument.
#[derive(Debug, Clone, PartialEq)]
pub struct CallArg {
    pub name: String,
    pub value: Value,
}

impl CallArg {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Raw event data.
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// Index in block.
    pub index: u32,
    /// Extrinsic position (only for `ApplyExtrinsic` phase events).
    pub extrinsic_index: Option<u32>,
    /// Pallet name.
    pub module_id: String,
    /// Event variant name (e.g. `ExtrinsicSuccess`).
    pub event_id: String,
    /// Event data as JSON.
    pub attributes: Value,
}

impl RawEvent {
    /// JSON form stored in the extrinsic's event list.
    pub fn to_json(&self) -> Value {
        json!({
            "event_index": self.index,
            "extrinsic_idx": self.extrinsic_index,
            "module_id": self.module_id,
            "event_id": self.event_id,
            "attributes": self.attributes,
        })
    }
}

/// Port trait for blockchain data source.
///
/// Both calls are read-only: a failure leaves nothing behind and the
/// whole block may be retried.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Fetch the header and decoded extrinsics of the block at `number`.
    async fn fetch_block(&self, number: u64) -> ChainResult<RawBlock>;

    /// Fetch the decoded events of the block with `hash`, in emission order.
    async fn fetch_events(&self, hash: &BlockHash) -> ChainResult<Vec<RawEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_json_keeps_order_and_names() {
        let call = RawCall {
            index: "0x0700".into(),
            module: Some("SubtensorModule".into()),
            function: Some("add_stake".into()),
            args: vec![CallArg::new("amount", json!(5)), CallArg::new("netuid", json!(12))],
        };
        assert_eq!(
            call.args_json(),
            json!([{ "name": "amount", "value": 5 }, { "name": "netuid", "value": 12 }])
        );
        assert!(call.is("SubtensorModule", "add_stake"));
        assert!(!call.is("SubtensorModule", "remove_stake"));
    }

    #[test]
    fn event_json_carries_position() {
        let event = RawEvent {
            index: 3,
            extrinsic_index: Some(1),
            module_id: "System".into(),
            event_id: "ExtrinsicSuccess".into(),
            attributes: json!({ "dispatch_info": {} }),
        };
        let value = event.to_json();
        assert_eq!(value["extrinsic_idx"], json!(1));
        assert_eq!(value["event_id"], json!("ExtrinsicSuccess"));
    }
}
