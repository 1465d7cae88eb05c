//! Per-extrinsic analysis: event correlation, result derivation, call
//! descriptor and `netuid` tag extraction.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::metrics::record_decode_error;
use crate::models::CallDescriptor;
use crate::ports::{CallArg, RawCall, RawEvent, RawExtrinsic};

/// Event identifier marking a successfully dispatched extrinsic.
pub const EXTRINSIC_SUCCESS: &str = "ExtrinsicSuccess";

/// Call argument carrying the subnet tag.
pub const NETUID_ARG: &str = "netuid";

/// Events of one block grouped by the extrinsic position they belong to.
///
/// Built once per block; each group keeps the events' arrival order.
#[derive(Debug, Default)]
pub struct EventIndex<'a> {
    by_position: HashMap<u32, Vec<&'a RawEvent>>,
}

impl<'a> EventIndex<'a> {
    pub fn new(events: &'a [RawEvent]) -> Self {
        let mut by_position: HashMap<u32, Vec<&'a RawEvent>> = HashMap::new();
        for event in events {
            if let Some(position) = event.extrinsic_index {
                by_position.entry(position).or_default().push(event);
            }
        }
        Self { by_position }
    }

    /// Events emitted while applying the extrinsic at `position`.
    pub fn events_for(&self, position: u32) -> &[&'a RawEvent] {
        self.by_position
            .get(&position)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Everything derived from one extrinsic and its events.
#[derive(Debug)]
pub struct ExtrinsicAnalysis<'a> {
    pub events: &'a [&'a RawEvent],
    pub success: bool,
    pub call: Option<CallDescriptor>,
    pub netuid: Option<i32>,
}

/// Analyze the extrinsic at `position` against the block's event index.
pub fn analyze<'a>(
    extrinsic: &RawExtrinsic,
    position: u32,
    events: &'a EventIndex<'a>,
) -> ExtrinsicAnalysis<'a> {
    let correlated = events.events_for(position);
    let call = extrinsic.call.as_ref();

    ExtrinsicAnalysis {
        events: correlated,
        success: is_success(correlated),
        call: call.and_then(call_descriptor),
        netuid: call.and_then(|c| extract_netuid(&c.args)),
    }
}

/// True iff any event is `ExtrinsicSuccess`.
pub fn is_success(events: &[&RawEvent]) -> bool {
    events.iter().any(|e| e.event_id == EXTRINSIC_SUCCESS)
}

/// Call identity, or `None` for an empty identifier.
pub fn call_descriptor(call: &RawCall) -> Option<CallDescriptor> {
    CallDescriptor::new(call.index.clone(), call.function.clone(), call.module.clone())
}

/// Value of the first `netuid` argument.
///
/// A value that is not an integer in `i32` range is treated as absent.
pub fn extract_netuid(args: &[CallArg]) -> Option<i32> {
    let arg = args.iter().find(|arg| arg.name == NETUID_ARG)?;

    let netuid = json_integer(&arg.value).and_then(|v| i32::try_from(v).ok());
    if netuid.is_none() {
        debug!(value = %arg.value, "Ignoring non-integer netuid argument");
        record_decode_error("netuid", "unknown");
    }
    netuid
}

/// Read an integer from a JSON number or a decimal string.
///
/// Large SCALE integers are carried as strings, so both forms appear.
pub(crate) fn json_integer(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from)),
        Value::String(s) => s.trim().parse::<i128>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtrinsicHash;
    use serde_json::json;

    fn event(index: u32, extrinsic_index: Option<u32>, event_id: &str) -> RawEvent {
        RawEvent {
            index,
            extrinsic_index,
            module_id: "System".into(),
            event_id: event_id.into(),
            attributes: Value::Null,
        }
    }

    fn extrinsic(call: Option<RawCall>) -> RawExtrinsic {
        RawExtrinsic {
            index: 0,
            hash: ExtrinsicHash([1; 32]),
            address: None,
            signature: None,
            tip: None,
            nonce: None,
            era: None,
            call,
        }
    }

    fn call(index: &str, args: Vec<CallArg>) -> RawCall {
        RawCall {
            index: index.into(),
            module: Some("SubtensorModule".into()),
            function: Some("add_stake".into()),
            args,
        }
    }

    #[test]
    fn correlation_keeps_arrival_order() {
        let events = vec![
            event(0, None, "Initialized"),
            event(1, Some(1), "Withdraw"),
            event(2, Some(0), "ExtrinsicSuccess"),
            event(3, Some(1), "StakeAdded"),
            event(4, Some(1), "ExtrinsicSuccess"),
        ];
        let index = EventIndex::new(&events);

        let ids: Vec<u32> = index.events_for(1).iter().map(|e| e.index).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert_eq!(index.events_for(0).len(), 1);
        assert!(index.events_for(7).is_empty());
    }

    #[test]
    fn success_requires_extrinsic_success_event() {
        let events = vec![
            event(0, Some(0), "Withdraw"),
            event(1, Some(0), "ExtrinsicFailed"),
            event(2, Some(1), "ExtrinsicSuccess"),
        ];
        let index = EventIndex::new(&events);

        assert!(!analyze(&extrinsic(None), 0, &index).success);
        assert!(analyze(&extrinsic(None), 1, &index).success);
        // No correlated events at all.
        assert!(!analyze(&extrinsic(None), 2, &index).success);
    }

    #[test]
    fn netuid_is_extracted_from_named_args() {
        let args = vec![CallArg::new("amount", json!(5)), CallArg::new("netuid", json!(12))];
        assert_eq!(extract_netuid(&args), Some(12));
    }

    #[test]
    fn netuid_absent_when_missing_or_malformed() {
        assert_eq!(extract_netuid(&[CallArg::new("amount", json!(5))]), None);
        assert_eq!(extract_netuid(&[CallArg::new("netuid", json!({"x": 1}))]), None);
        assert_eq!(extract_netuid(&[CallArg::new("netuid", json!(u64::MAX))]), None);
        assert_eq!(extract_netuid(&[CallArg::new("netuid", json!("7"))]), Some(7));
    }

    #[test]
    fn descriptor_skips_empty_identifier() {
        let analysis_index = EventIndex::default();
        let with_call = analyze(&extrinsic(Some(call("0x0702", vec![]))), 0, &analysis_index);
        let descriptor = with_call.call.unwrap();
        assert_eq!(descriptor.call_index, "0x0702");
        assert_eq!(descriptor.module.as_deref(), Some("SubtensorModule"));
        assert_eq!(descriptor.function.as_deref(), Some("add_stake"));

        let empty = analyze(&extrinsic(Some(call("", vec![]))), 0, &analysis_index);
        assert!(empty.call.is_none());

        let undecoded = analyze(&extrinsic(None), 0, &analysis_index);
        assert!(undecoded.call.is_none());
        assert!(undecoded.netuid.is_none());
    }

    #[test]
    fn json_integer_accepts_numbers_and_strings() {
        assert_eq!(json_integer(&json!(42)), Some(42));
        assert_eq!(json_integer(&json!(-3)), Some(-3));
        assert_eq!(json_integer(&json!(u64::MAX)), Some(u64::MAX as i128));
        assert_eq!(json_integer(&json!("1700000000000")), Some(1_700_000_000_000));
        assert_eq!(json_integer(&json!(1.5)), None);
        assert_eq!(json_integer(&Value::Null), None);
    }
}
