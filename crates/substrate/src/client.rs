//! Substrate RPC client decoding each block with its own runtime metadata.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde_json::json;
use subxt::PolkadotConfig;
use subxt::backend::legacy::LegacyRpcMethods;
use subxt::backend::rpc::RpcClient;
use subxt::config::transaction_extensions::CheckMortality;
use subxt::ext::codec::{Decode, Encode};
use subxt::utils::{AccountId32, H256};
use subxt_core::Metadata;
use subxt_core::blocks::{ExtrinsicDetails, Extrinsics};
use subxt_core::events::{EventDetails, Events, Phase};
use tracing::{debug, instrument, trace, warn};

use tensorscan_core::error::{ChainError, ChainResult};
use tensorscan_core::metrics::record_decode_error;
use tensorscan_core::models::{BlockHash, ExtrinsicHash};
use tensorscan_core::ports::{CallArg, ChainClient, RawBlock, RawCall, RawEvent, RawExtrinsic};

/// Public Bittensor archive node.
pub const DEFAULT_CHAIN_ENDPOINT: &str = "wss://archive.chain.opentensor.ai:443";

/// `twox128("System") ++ twox128("Events")`.
const SYSTEM_EVENTS_KEY: [u8; 32] = [
    0x26, 0xaa, 0x39, 0x4e, 0xea, 0x56, 0x30, 0xe0, 0x7c, 0x48, 0xae, 0x0c, 0x95, 0x58, 0xce, 0xf7,
    0x80, 0xd4, 0x1e, 0x5e, 0x16, 0x05, 0x67, 0x65, 0xbc, 0x84, 0x61, 0x85, 0x10, 0x72, 0xc9, 0xd7,
];

/// Configuration for the Substrate client.
#[derive(Debug, Clone)]
pub struct SubstrateClientConfig {
    /// WebSocket URL (e.g., "wss://archive.chain.opentensor.ai:443").
    pub ws_url: String,
}

impl Default for SubstrateClientConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_CHAIN_ENDPOINT.to_string(),
        }
    }
}

type SubstrateExtrinsic = ExtrinsicDetails<PolkadotConfig>;

/// Substrate client adapter implementing the ChainClient port.
///
/// Uses the legacy RPC methods, which can address any historical block by
/// hash on an archive node. Every block is decoded with the metadata of the
/// runtime it was produced under, loaded once per spec version.
pub struct SubstrateClient {
    rpc: LegacyRpcMethods<PolkadotConfig>,
    metadata: Mutex<HashMap<u32, Metadata>>,
}

impl SubstrateClient {
    /// Connect to a Substrate node.
    #[instrument(skip_all, fields(url = %config.ws_url))]
    pub async fn connect(config: SubstrateClientConfig) -> ChainResult<Self> {
        debug!("Connecting to node");

        let rpc_client = RpcClient::from_url(&config.ws_url)
            .await
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;
        let rpc = LegacyRpcMethods::<PolkadotConfig>::new(rpc_client);

        let version = rpc
            .state_get_runtime_version(None)
            .await
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;
        debug!(spec_version = version.spec_version, "Connected successfully");

        Ok(Self {
            rpc,
            metadata: Mutex::new(HashMap::new()),
        })
    }

    async fn block_hash(&self, number: u64) -> ChainResult<H256> {
        self.rpc
            .chain_get_block_hash(Some(number.into()))
            .await
            .map_err(rpc_error)?
            .ok_or(ChainError::UnknownBlock(number))
    }

    /// Metadata of the runtime in force at `hash`.
    async fn metadata_at(&self, hash: H256) -> ChainResult<Metadata> {
        let spec_version = self
            .rpc
            .state_get_runtime_version(Some(hash))
            .await
            .map_err(rpc_error)?
            .spec_version;

        if let Some(metadata) = self.cache().get(&spec_version) {
            return Ok(metadata.clone());
        }

        let metadata_error = |message: String| ChainError::Metadata {
            spec_version,
            message,
        };
        let raw = self
            .rpc
            .state_get_metadata(Some(hash))
            .await
            .map_err(|e| metadata_error(e.to_string()))?
            .into_raw();
        let metadata =
            Metadata::decode(&mut &raw[..]).map_err(|e| metadata_error(e.to_string()))?;

        debug!(spec_version, "📜 Loaded runtime metadata");
        self.cache().insert(spec_version, metadata.clone());
        Ok(metadata)
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<u32, Metadata>> {
        // The map only ever holds complete entries.
        self.metadata
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn rpc_error(e: impl fmt::Display) -> ChainError {
    ChainError::RpcError(e.to_string())
}

#[async_trait]
impl ChainClient for SubstrateClient {
    #[instrument(skip(self))]
    async fn fetch_block(&self, number: u64) -> ChainResult<RawBlock> {
        let hash = self.block_hash(number).await?;
        let metadata = self.metadata_at(hash).await?;

        let details = self
            .rpc
            .chain_get_block(Some(hash))
            .await
            .map_err(|e| ChainError::BlockFetchError {
                hash: format!("{:?}", hash),
                message: e.to_string(),
            })?
            .ok_or(ChainError::UnknownBlock(number))?;

        let header = details.block.header;
        let extrinsics: Vec<RawExtrinsic> = (0u32..)
            .zip(details.block.extrinsics)
            .map(|(index, bytes)| decode_extrinsic(index, bytes.0, &metadata))
            .collect();
        trace!(count = extrinsics.len(), "Decoded extrinsics");

        Ok(RawBlock {
            number: u64::from(header.number),
            hash: hash.0,
            parent_hash: header.parent_hash.0,
            state_root: header.state_root.0,
            extrinsics_root: header.extrinsics_root.0,
            extrinsics,
        })
    }

    #[instrument(skip_all, fields(hash = %hash))]
    async fn fetch_events(&self, hash: &BlockHash) -> ChainResult<Vec<RawEvent>> {
        let at = H256(hash.0);
        let metadata = self.metadata_at(at).await?;

        let Some(bytes) = self
            .rpc
            .state_get_storage(&SYSTEM_EVENTS_KEY, Some(at))
            .await
            .map_err(|e| ChainError::BlockFetchError {
                hash: hash.to_hex(),
                message: e.to_string(),
            })?
        else {
            warn!("No System.Events storage at block");
            return Ok(Vec::new());
        };

        let events = Events::<PolkadotConfig>::decode_from(bytes, metadata);
        collect_events(
            hash,
            events.len(),
            events.iter().map(|event| event.map(|ev| event_to_raw(&ev))),
        )
    }
}

// =============================================================================
// Event decoding
// =============================================================================

/// Gather decoded events, failing on the first one that does not decode.
///
/// Events are SCALE-concatenated, so nothing after a decode failure can be
/// located. A partial list would misreport the result of later extrinsics.
fn collect_events<E: fmt::Display>(
    hash: &BlockHash,
    expected: u32,
    decoded: impl IntoIterator<Item = Result<RawEvent, E>>,
) -> ChainResult<Vec<RawEvent>> {
    let incomplete = |decoded: usize, message: String| {
        record_decode_error("event", "unknown");
        ChainError::IncompleteEvents {
            hash: hash.to_hex(),
            decoded: u32::try_from(decoded).unwrap_or(u32::MAX),
            expected,
            message,
        }
    };

    let mut raw_events = Vec::new();
    for event in decoded {
        match event {
            Ok(event) => raw_events.push(event),
            Err(e) => return Err(incomplete(raw_events.len(), e.to_string())),
        }
    }

    if raw_events.len() < expected as usize {
        return Err(incomplete(raw_events.len(), "event stream ended early".into()));
    }
    Ok(raw_events)
}

fn event_to_raw(ev: &EventDetails<PolkadotConfig>) -> RawEvent {
    let attributes = match ev.field_values() {
        Ok(composite) => composite_to_json(&composite),
        Err(e) => {
            trace!(index = ev.index(), error = %e, "Failed to decode event fields");
            record_decode_error("event_fields", ev.pallet_name());
            serde_json::Value::Null
        }
    };

    let extrinsic_index = match ev.phase() {
        Phase::ApplyExtrinsic(idx) => Some(idx),
        _ => None,
    };

    RawEvent {
        index: ev.index(),
        extrinsic_index,
        module_id: ev.pallet_name().to_string(),
        event_id: ev.variant_name().to_string(),
        attributes,
    }
}

// =============================================================================
// Extrinsic decoding
// =============================================================================

/// Blake2-256, the hash Substrate gives an encoded extrinsic.
fn extrinsic_hash(bytes: &[u8]) -> ExtrinsicHash {
    ExtrinsicHash(Blake2b::<U32>::digest(bytes).into())
}

/// Decode one encoded extrinsic on its own.
///
/// A failure only affects this extrinsic: it keeps its position and hash,
/// and everything else is absent.
fn decode_extrinsic(index: u32, bytes: Vec<u8>, metadata: &Metadata) -> RawExtrinsic {
    let hash = extrinsic_hash(&bytes);

    let decoded = Extrinsics::<PolkadotConfig>::decode_from(vec![bytes], metadata.clone())
        .map_err(|e| e.to_string())
        .and_then(|extrinsics| {
            extrinsics
                .iter()
                .next()
                .ok_or_else(|| "no extrinsic decoded".to_string())
        });

    match decoded {
        Ok(ext) => extrinsic_from_details(index, hash, &ext),
        Err(e) => {
            warn!(index, hash = %hash, error = %e, "Undecodable extrinsic");
            record_decode_error("extrinsic", "unknown");
            undecodable_extrinsic(index, hash)
        }
    }
}

fn undecodable_extrinsic(index: u32, hash: ExtrinsicHash) -> RawExtrinsic {
    RawExtrinsic {
        index,
        hash,
        address: None,
        signature: None,
        tip: None,
        nonce: None,
        era: None,
        call: None,
    }
}

/// Undecodable parts of a decoded extrinsic become `None`.
fn extrinsic_from_details(index: u32, hash: ExtrinsicHash, ext: &SubstrateExtrinsic) -> RawExtrinsic {
    let (tip, nonce, era) = match ext.transaction_extensions() {
        Some(extensions) => {
            let era = match extensions.find::<CheckMortality<PolkadotConfig>>() {
                Ok(era) => era.map(|era| hex::encode(era.encode())),
                Err(e) => {
                    trace!(index, error = %e, "Failed to decode mortality");
                    record_decode_error("era", "unknown");
                    None
                }
            };
            (extensions.tip(), extensions.nonce(), era)
        }
        None => (None, None, None),
    };

    RawExtrinsic {
        index,
        hash,
        address: ext.address_bytes().map(address_string),
        signature: ext.signature_bytes().and_then(signature_json),
        tip,
        nonce,
        era,
        call: decode_call(index, ext),
    }
}

fn decode_call(position: u32, ext: &SubstrateExtrinsic) -> Option<RawCall> {
    let index = call_index_hex(ext.pallet_index(), ext.variant_index());

    let module = ext.pallet_name().ok().map(str::to_string);
    let function = ext.variant_name().ok().map(str::to_string);

    match ext.field_values() {
        Ok(fields) => Some(RawCall {
            index,
            module,
            function,
            args: call_args(&fields),
        }),
        Err(e) => {
            let pallet = module.as_deref().unwrap_or("unknown");
            trace!(index = position, call = %index, error = %e, "Failed to decode call");
            record_decode_error("call", pallet);
            None
        }
    }
}

/// `0x<pallet index><call index>`, two hex digits each.
fn call_index_hex(pallet: u8, call: u8) -> String {
    format!("0x{:02x}{:02x}", pallet, call)
}

/// Render an encoded `MultiAddress` as SS58 when it wraps an account id.
fn address_string(bytes: &[u8]) -> String {
    let account = match bytes {
        [0, rest @ ..] if rest.len() == 32 => rest,
        _ if bytes.len() == 32 => bytes,
        _ => return format!("0x{}", hex::encode(bytes)),
    };

    let mut arr = [0u8; 32];
    arr.copy_from_slice(account);
    AccountId32(arr).to_string()
}

/// Render an encoded `MultiSignature` as `{"<scheme>": "0x.."}`.
fn signature_json(bytes: &[u8]) -> Option<serde_json::Value> {
    let (&variant, sig) = bytes.split_first()?;
    let scheme = match (variant, sig.len()) {
        (0, 64) => "Ed25519",
        (1, 64) => "Sr25519",
        (2, 65) => "Ecdsa",
        _ => {
            trace!(variant, len = sig.len(), "Unrecognized signature encoding");
            return Some(json!({ "Raw": format!("0x{}", hex::encode(bytes)) }));
        }
    };
    Some(json!({ scheme: format!("0x{}", hex::encode(sig)) }))
}

/// Split call fields into named arguments.
///
/// Unnamed fields are named by their position.
fn call_args<T>(fields: &Composite<T>) -> Vec<CallArg> {
    match fields {
        Composite::Named(named) => named
            .iter()
            .map(|(name, value)| CallArg::new(name.clone(), value_to_json(value)))
            .collect(),
        Composite::Unnamed(values) => values
            .iter()
            .enumerate()
            .map(|(i, value)| CallArg::new(i.to_string(), value_to_json(value)))
            .collect(),
    }
}

// =============================================================================
// SCALE Value to JSON conversion
// =============================================================================

use subxt::ext::scale_value::{Composite, Primitive, Value, ValueDef};

/// Convert a Composite to a JSON value.
fn composite_to_json<T>(composite: &Composite<T>) -> serde_json::Value {
    match composite {
        Composite::Unnamed(values) => {
            // Byte arrays (AccountId, Hash) become hex.
            if let Some(hex_str) = try_as_byte_array(values) {
                return serde_json::Value::String(hex_str);
            }
            // Newtype wrappers.
            if values.len() == 1 {
                return value_to_json(&values[0]);
            }
            serde_json::Value::Array(values.iter().map(value_to_json).collect())
        }
        Composite::Named(fields) => {
            let obj: serde_json::Map<String, serde_json::Value> = fields
                .iter()
                .map(|(name, v)| (name.clone(), value_to_json(v)))
                .collect();
            serde_json::Value::Object(obj)
        }
    }
}

/// Hex string when an unnamed composite is a fixed-size byte array.
fn try_as_byte_array<T>(values: &[Value<T>]) -> Option<String> {
    let len = values.len();
    if len != 32 && len != 20 && len != 64 {
        return None;
    }

    let mut bytes = Vec::with_capacity(len);
    for value in values {
        match &value.value {
            ValueDef::Primitive(Primitive::U128(n)) if *n <= 255 => bytes.push(*n as u8),
            _ => return None,
        }
    }

    Some(format!("0x{}", hex::encode(bytes)))
}

fn value_to_json<T>(value: &Value<T>) -> serde_json::Value {
    value_def_to_json(&value.value)
}

fn value_def_to_json<T>(value: &ValueDef<T>) -> serde_json::Value {
    match value {
        ValueDef::Composite(composite) => composite_to_json(composite),
        ValueDef::Variant(variant) => {
            let inner = composite_to_json(&variant.values);

            match variant.name.as_str() {
                "None" => serde_json::Value::Null,
                // Option and MultiAddress wrappers carry a single value.
                "Some" | "Id" => match inner {
                    serde_json::Value::Array(mut arr) if arr.len() == 1 => arr.remove(0),
                    other => other,
                },
                // Fieldless enum variants.
                name if variant.values.is_empty() => serde_json::Value::String(name.to_string()),
                name => {
                    let mut map = serde_json::Map::new();
                    map.insert(name.to_string(), inner);
                    serde_json::Value::Object(map)
                }
            }
        }
        ValueDef::Primitive(primitive) => primitive_to_json(primitive),
        ValueDef::BitSequence(bits) => serde_json::Value::String(format!("{:?}", bits)),
    }
}

/// Integers that fit JSON's safe 64-bit range stay numbers; wider ones become strings.
fn primitive_to_json(primitive: &Primitive) -> serde_json::Value {
    match primitive {
        Primitive::Bool(b) => serde_json::Value::Bool(*b),
        Primitive::Char(c) => serde_json::Value::String(c.to_string()),
        Primitive::String(s) => serde_json::Value::String(s.clone()),
        Primitive::U128(n) => match u64::try_from(*n) {
            Ok(n) => json!(n),
            Err(_) => serde_json::Value::String(n.to_string()),
        },
        Primitive::I128(n) => match i64::try_from(*n) {
            Ok(n) => json!(n),
            Err(_) => serde_json::Value::String(n.to_string()),
        },
        Primitive::U256(n) => serde_json::Value::String(format!("0x{}", hex::encode(n))),
        Primitive::I256(n) => serde_json::Value::String(format!("0x{}", hex::encode(n))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_index_is_zero_padded_hex() {
        assert_eq!(call_index_hex(2, 0), "0x0200");
        assert_eq!(call_index_hex(7, 2), "0x0702");
        assert_eq!(call_index_hex(255, 16), "0xff10");
    }

    #[test]
    fn address_from_multiaddress_id() {
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(&[0u8; 32]);
        // All-zero account under the generic substrate prefix.
        assert_eq!(
            address_string(&bytes),
            "5C4hrfjw9DjXZTzV3MwzrrAr9P1MJhSrvWGWqi1eSuyUpnhM"
        );
        assert_eq!(address_string(&[0u8; 32]), address_string(&bytes));
    }

    #[test]
    fn address_other_variants_are_hex() {
        let mut bytes = vec![4u8];
        bytes.extend_from_slice(&[0xab; 20]);
        assert_eq!(address_string(&bytes), format!("0x04{}", "ab".repeat(20)));
    }

    #[test]
    fn signature_scheme_from_variant() {
        let mut sr = vec![1u8];
        sr.extend_from_slice(&[0x11; 64]);
        assert_eq!(
            signature_json(&sr),
            Some(json!({ "Sr25519": format!("0x{}", "11".repeat(64)) }))
        );

        let mut ecdsa = vec![2u8];
        ecdsa.extend_from_slice(&[0x22; 65]);
        assert!(signature_json(&ecdsa).unwrap().get("Ecdsa").is_some());

        assert_eq!(signature_json(&[]), None);
        assert!(signature_json(&[9, 1, 2]).unwrap().get("Raw").is_some());
    }

    #[test]
    fn integers_keep_number_form_when_they_fit() {
        assert_eq!(
            primitive_to_json(&Primitive::U128(1_700_000_000_000)),
            json!(1_700_000_000_000u64)
        );
        assert_eq!(primitive_to_json(&Primitive::I128(-5)), json!(-5));
        assert_eq!(
            primitive_to_json(&Primitive::U128(u128::MAX)),
            json!(u128::MAX.to_string())
        );
    }

    #[test]
    fn named_call_fields_become_args() {
        let fields = Composite::Named(vec![
            ("netuid".to_string(), Value::u128(3)),
            ("hotkey".to_string(), Value::unnamed_composite(vec![Value::u128(1); 32])),
        ]);

        let args = call_args(&fields);
        assert_eq!(args.len(), 2);
        assert_eq!(args[0], CallArg::new("netuid", json!(3)));
        assert_eq!(args[1].value, json!(format!("0x{}", "01".repeat(32))));
    }

    #[test]
    fn variants_are_simplified() {
        let none = Value::variant("None", Composite::Unnamed(vec![]));
        assert_eq!(value_to_json(&none), serde_json::Value::Null);

        let some = Value::variant("Some", Composite::Unnamed(vec![Value::bool(true)]));
        assert_eq!(value_to_json(&some), json!(true));

        let unit = Value::variant("Normal", Composite::Unnamed(vec![]));
        assert_eq!(value_to_json(&unit), json!("Normal"));

        let payload = Value::variant(
            "Transfer",
            Composite::Named(vec![("amount".into(), Value::u128(10))]),
        );
        assert_eq!(value_to_json(&payload), json!({ "Transfer": { "amount": 10 } }));
    }

    #[test]
    fn extrinsic_hash_is_blake2_256() {
        assert_eq!(
            extrinsic_hash(&[]).to_hex(),
            "0x0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn undecodable_extrinsic_keeps_position_and_hash() {
        let hash = extrinsic_hash(&[0x04, 0xff, 0xff]);
        let ext = undecodable_extrinsic(7, hash.clone());

        assert_eq!(ext.index, 7);
        assert_eq!(ext.hash, hash);
        assert!(ext.call.is_none());
        assert!(ext.address.is_none() && ext.signature.is_none());
        assert!(ext.tip.is_none() && ext.nonce.is_none() && ext.era.is_none());
    }

    fn raw_event(index: u32) -> RawEvent {
        RawEvent {
            index,
            extrinsic_index: Some(index),
            module_id: "System".into(),
            event_id: "ExtrinsicSuccess".into(),
            attributes: serde_json::Value::Null,
        }
    }

    #[test]
    fn complete_event_stream_is_kept_in_order() {
        let hash = BlockHash([1; 32]);
        let decoded: Vec<Result<RawEvent, String>> = vec![Ok(raw_event(0)), Ok(raw_event(1))];

        let events = collect_events(&hash, 2, decoded).unwrap();
        let indices: Vec<u32> = events.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn event_decode_failure_fails_the_block() {
        let hash = BlockHash([1; 32]);
        let decoded: Vec<Result<RawEvent, String>> = vec![
            Ok(raw_event(0)),
            Err("unknown pallet index 42".into()),
            Ok(raw_event(2)),
        ];

        match collect_events(&hash, 3, decoded) {
            Err(ChainError::IncompleteEvents {
                decoded,
                expected,
                message,
                ..
            }) => {
                assert_eq!((decoded, expected), (1, 3));
                assert!(message.contains("unknown pallet index"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn short_event_stream_fails_the_block() {
        let hash = BlockHash([1; 32]);
        let decoded: Vec<Result<RawEvent, String>> = vec![Ok(raw_event(0))];

        assert!(matches!(
            collect_events(&hash, 4, decoded),
            Err(ChainError::IncompleteEvents { decoded: 1, expected: 4, .. })
        ));
    }
}
