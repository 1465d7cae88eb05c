//! Domain models representing ingested blockchain data.
//!
//! These models are storage-agnostic and represent the canonical
//! form of ingested data within the domain layer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

// =============================================================================
// 32-byte Hash Types
// =============================================================================

/// Macro to generate 32-byte hash newtypes with common functionality.
///
/// Generates:
/// - `from_hex()` - Parse from hex string (with or without 0x prefix)
/// - `to_hex()` - Convert to 0x-prefixed hex string
/// - `Display` trait implementation
/// - `From<[u8; 32]>` implementation
macro_rules! hash32_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Parse from hex string (with or without 0x prefix).
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s)?;
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }

            /// Convert to 0x-prefixed hex string.
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

hash32_newtype!(
    /// 32-byte block hash (Blake2-256).
    BlockHash
);

hash32_newtype!(
    /// 32-byte extrinsic hash (Blake2-256 of the encoded extrinsic).
    ExtrinsicHash
);

// =============================================================================
// Block
// =============================================================================

/// Ingested block header with its derived timestamp.
///
/// Written once per ingestion run and never updated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block number (height). Unique.
    pub number: u64,
    /// Block hash. Unique.
    pub hash: BlockHash,
    /// Parent block hash.
    pub parent_hash: BlockHash,
    /// State root after executing this block.
    pub state_root: BlockHash,
    /// Extrinsics root (merkle root of extrinsics).
    pub extrinsics_root: BlockHash,
    /// Timestamp from the first `Timestamp.set` call (if any).
    pub timestamp: Option<DateTime<Utc>>,
    /// Number of extrinsics in this block.
    pub extrinsic_count: u32,
    /// Number of events in this block.
    pub event_count: u32,
    /// When this block was ingested.
    pub indexed_at: DateTime<Utc>,
}

// =============================================================================
// Calls
// =============================================================================

/// Distinct call type, deduplicated across all blocks by `call_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    /// Hex call index, `0x<pallet index><call index>` (e.g. `0x0200`).
    pub call_index: String,
    /// Call function name (e.g. `set`).
    pub function: Option<String>,
    /// Call module name (e.g. `Timestamp`).
    pub module: Option<String>,
}

/// The `{identifier, module, function}` identity of an extrinsic's call.
///
/// Only constructed with a non-empty identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDescriptor {
    pub call_index: String,
    pub function: Option<String>,
    pub module: Option<String>,
}

impl CallDescriptor {
    /// Build a descriptor, or `None` when the identifier is empty.
    pub fn new(
        call_index: impl Into<String>,
        function: Option<String>,
        module: Option<String>,
    ) -> Option<Self> {
        let call_index = call_index.into();
        if call_index.trim().is_empty() {
            return None;
        }
        Some(Self {
            call_index,
            function,
            module,
        })
    }
}

impl From<&CallDescriptor> for Call {
    fn from(descriptor: &CallDescriptor) -> Self {
        Self {
            call_index: descriptor.call_index.clone(),
            function: descriptor.function.clone(),
            module: descriptor.module.clone(),
        }
    }
}

// =============================================================================
// Extrinsics
// =============================================================================

/// Derived execution result of an extrinsic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtrinsicResult {
    Success,
    Failed,
}

impl ExtrinsicResult {
    /// `Success` when the extrinsic emitted `ExtrinsicSuccess`.
    pub fn from_success(success: bool) -> Self {
        if success { Self::Success } else { Self::Failed }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Parse the stored column value.
    pub fn from_db(s: &str) -> StorageResult<Self> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(StorageError::SerializationError(format!(
                "unknown extrinsic result {other:?}"
            ))),
        }
    }
}

impl fmt::Display for ExtrinsicResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ingested extrinsic (signed transaction or unsigned inherent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extrinsic {
    /// Position identifier: `<block number>-<index padded to 4 digits>`.
    pub id: String,
    /// Extrinsic hash. Unique.
    pub hash: ExtrinsicHash,
    /// Subnet tag taken from a `netuid` call argument.
    pub netuid: Option<i32>,
    /// Sender address (None for unsigned/inherent).
    pub address: Option<String>,
    /// Block number containing this extrinsic.
    pub block_number: u64,
    /// Index within the block (0-based).
    pub index: u32,
    /// Signature as `{"<scheme>": "0x.."}`.
    pub signature: Option<serde_json::Value>,
    /// Tip paid (in smallest unit).
    pub tip: Option<u128>,
    /// Nonce (if signed).
    pub nonce: Option<u64>,
    /// Mortality era, hex encoded (`00` for immortal).
    pub era: Option<String>,
    /// Referenced call type.
    pub call_index: Option<String>,
    /// Call arguments as a JSON list of `{name, value}`.
    pub call_args: serde_json::Value,
    /// Derived result.
    pub result: ExtrinsicResult,
    /// Correlated events, in arrival order.
    pub events: Vec<serde_json::Value>,
}

impl Extrinsic {
    /// Build the position identifier for extrinsic `index` of `block_number`.
    pub fn position_id(block_number: u64, index: u32) -> String {
        format!("{}-{:04}", block_number, index)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_hash_hex_roundtrip() {
        let hex = "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
        let hash = BlockHash::from_hex(hex).unwrap();
        assert_eq!(hash.to_hex(), hex);
    }

    #[test]
    fn block_hash_without_prefix() {
        let hex = "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
        let hash = BlockHash::from_hex(hex).unwrap();
        assert_eq!(hash.to_hex(), format!("0x{}", hex));
    }

    #[test]
    fn hash32_invalid_length() {
        assert!(ExtrinsicHash::from_hex("0x1234").is_err());
    }

    #[test]
    fn position_id_is_zero_padded() {
        assert_eq!(Extrinsic::position_id(3593992, 7), "3593992-0007");
        assert_eq!(Extrinsic::position_id(3593992, 0), "3593992-0000");
        assert_eq!(Extrinsic::position_id(1, 12345), "1-12345");
    }

    #[test]
    fn call_descriptor_rejects_empty_identifier() {
        assert!(CallDescriptor::new("", None, None).is_none());
        assert!(CallDescriptor::new("  ", Some("set".into()), None).is_none());
        assert!(CallDescriptor::new("0x0200", Some("set".into()), Some("Timestamp".into())).is_some());
    }

    #[test]
    fn extrinsic_result_strings() {
        assert_eq!(ExtrinsicResult::from_success(true).as_str(), "success");
        assert_eq!(ExtrinsicResult::from_success(false).as_str(), "failed");
        assert_eq!(ExtrinsicResult::from_db("success").unwrap(), ExtrinsicResult::Success);
        assert_eq!(ExtrinsicResult::from_db("failed").unwrap(), ExtrinsicResult::Failed);
    }

    #[test]
    fn corrupt_stored_result_is_rejected() {
        let err = ExtrinsicResult::from_db("garbage").unwrap_err();
        assert!(matches!(err, StorageError::SerializationError(_)));
        assert!(ExtrinsicResult::from_db("Success").is_err());
    }
}
