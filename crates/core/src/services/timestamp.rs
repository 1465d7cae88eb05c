//! Block timestamp extraction from the `Timestamp.set` inherent.

use chrono::{DateTime, Utc};
use tracing::{trace, warn};

use crate::metrics::record_decode_error;
use crate::ports::RawExtrinsic;

use super::analyzer::json_integer;

pub const TIMESTAMP_MODULE: &str = "Timestamp";
pub const TIMESTAMP_FUNCTION: &str = "set";

/// Derive the block timestamp from its extrinsics.
///
/// The first `Timestamp.set` call is canonical; later ones are ignored even
/// when the first cannot be decoded. Its first argument is read as
/// milliseconds since the Unix epoch.
pub fn extract_timestamp(extrinsics: &[RawExtrinsic]) -> Option<DateTime<Utc>> {
    let (position, call) = extrinsics
        .iter()
        .enumerate()
        .find_map(|(i, ext)| match &ext.call {
            Some(call) if call.is(TIMESTAMP_MODULE, TIMESTAMP_FUNCTION) => Some((i, call)),
            _ => None,
        })?;

    let Some(arg) = call.args.first() else {
        warn!(position, "Timestamp.set carries no argument");
        record_decode_error("timestamp", TIMESTAMP_MODULE);
        return None;
    };

    let timestamp = json_integer(&arg.value)
        .and_then(|millis| i64::try_from(millis).ok())
        .filter(|millis| *millis >= 0)
        .and_then(DateTime::from_timestamp_millis);

    match timestamp {
        Some(ts) => trace!(position, %ts, "Block timestamp found"),
        None => {
            warn!(position, value = %arg.value, "Could not parse Timestamp.set argument");
            record_decode_error("timestamp", TIMESTAMP_MODULE);
        }
    }

    timestamp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtrinsicHash;
    use crate::ports::{CallArg, RawCall};
    use serde_json::{Value, json};

    fn ext(index: u32, module: &str, function: &str, args: Vec<CallArg>) -> RawExtrinsic {
        RawExtrinsic {
            index,
            hash: ExtrinsicHash([index as u8; 32]),
            address: None,
            signature: None,
            tip: None,
            nonce: None,
            era: None,
            call: Some(RawCall {
                index: "0x0200".into(),
                module: Some(module.into()),
                function: Some(function.into()),
                args,
            }),
        }
    }

    fn set(index: u32, value: Value) -> RawExtrinsic {
        ext(index, "Timestamp", "set", vec![CallArg::new("now", value)])
    }

    #[test]
    fn millis_become_utc_seconds() {
        let ts = extract_timestamp(&[set(0, json!(1_700_000_000_000u64))]).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_millis(), 0);
    }

    #[test]
    fn string_encoded_millis_are_accepted() {
        let ts = extract_timestamp(&[set(0, json!("1700000000123"))]).unwrap();
        assert_eq!(ts.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn absent_without_timestamp_call() {
        let extrinsics = vec![ext(0, "Balances", "transfer", vec![])];
        assert!(extract_timestamp(&extrinsics).is_none());
        assert!(extract_timestamp(&[]).is_none());
    }

    #[test]
    fn first_occurrence_wins() {
        let extrinsics = vec![
            ext(0, "Balances", "transfer", vec![]),
            set(1, json!(1_700_000_000_000u64)),
            set(2, json!(1_800_000_000_000u64)),
        ];
        let ts = extract_timestamp(&extrinsics).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn malformed_first_call_does_not_fall_through() {
        let extrinsics = vec![set(0, json!("not a number")), set(1, json!(1_700_000_000_000u64))];
        assert!(extract_timestamp(&extrinsics).is_none());
    }

    #[test]
    fn module_and_function_must_both_match() {
        let extrinsics = vec![
            ext(0, "Timestamp", "other", vec![CallArg::new("now", json!(1))]),
            ext(1, "Other", "set", vec![CallArg::new("now", json!(1))]),
        ];
        assert!(extract_timestamp(&extrinsics).is_none());
    }

    #[test]
    fn missing_argument_is_absent() {
        assert!(extract_timestamp(&[ext(0, "Timestamp", "set", vec![])]).is_none());
    }
}
