//! Event records exchanged with the neighbouring pipeline stages.
//!
//! Field names follow the camelCase wire format used across the mesh. The
//! aliases accept the older field names still emitted by some upstream
//! stages (`type`, `user`, `metadata`, `passedRules`).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Event kind whose payload carries an encoded `ProcessedWorkItem`.
pub const WORK_ITEM_KIND: &str = "work-item";

// ---------------------------------------------------------------------------
// EventValue
// ---------------------------------------------------------------------------

/// Numeric value of an event as it appears on the wire.
///
/// Upstream parsers disagree on the representation: some send integers,
/// some floats, some decimal strings. The value is kept as received and
/// interpreted lazily by [`EventValue::as_integer`]. Any other wire value
/// (boolean, null, object, array) is kept in `Other` so the rule path can
/// reject it instead of the whole frame failing to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Other(serde_json::Value),
}

impl EventValue {
    /// Interprets the value as an integer.
    ///
    /// Integers are returned as-is, finite floats are truncated toward zero,
    /// and strings are parsed as an integer first and as a finite float
    /// second. Returns `None` for anything else (`NaN`, infinities,
    /// non-numeric text).
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Float(f) => truncate(*f),
            Self::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(truncate))
            }
            Self::Other(_) => None,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn truncate(f: f64) -> Option<i64> {
    f.is_finite().then(|| f.trunc() as i64)
}

impl Default for EventValue {
    fn default() -> Self {
        Self::Integer(0)
    }
}

impl From<i64> for EventValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for EventValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for EventValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl fmt::Display for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Other(v) => write!(f, "{v}"),
        }
    }
}

// ---------------------------------------------------------------------------
// RawEvent
// ---------------------------------------------------------------------------

/// An event as received from the upstream stage.
///
/// `payload` is opaque to the rule path. For `kind == "work-item"` it holds
/// a JSON-encoded `ProcessedWorkItem`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: EventValue,
    #[serde(default, alias = "user")]
    pub payload: String,
    /// Epoch millis assigned by the parse stage. Carried through untouched.
    #[serde(default)]
    pub timestamp: i64,
    /// Position in the original input. Carried through untouched.
    #[serde(default)]
    pub sequence: u64,
}

impl RawEvent {
    pub fn new(kind: impl Into<String>, value: impl Into<EventValue>, payload: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
            payload: payload.into(),
            timestamp: 0,
            sequence: 0,
        }
    }

    #[must_use]
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    #[must_use]
    pub fn is_work_item(&self) -> bool {
        self.kind == WORK_ITEM_KIND
    }
}

// ---------------------------------------------------------------------------
// EnrichedEvent
// ---------------------------------------------------------------------------

/// An event that survived this stage, with the tags attached to it.
///
/// Only built by the rule evaluator and the work-item enricher, and only
/// with `passed == true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedEvent {
    pub event: RawEvent,
    #[serde(default, alias = "metadata")]
    pub tags: BTreeMap<String, String>,
    #[serde(alias = "passedRules")]
    pub passed: bool,
}

impl EnrichedEvent {
    pub(crate) fn admitted(event: RawEvent, tag_key: &str, tag_value: &str) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(tag_key.to_string(), tag_value.to_string());
        Self {
            event,
            tags,
            passed: true,
        }
    }

    /// Returns the tag value for `key`, if present.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_value_is_returned_as_is() {
        assert_eq!(EventValue::Integer(-3).as_integer(), Some(-3));
    }

    #[test]
    fn float_value_truncates_toward_zero() {
        assert_eq!(EventValue::Float(15.9).as_integer(), Some(15));
        assert_eq!(EventValue::Float(-2.7).as_integer(), Some(-2));
    }

    #[test]
    fn non_finite_float_is_not_an_integer() {
        assert_eq!(EventValue::Float(f64::NAN).as_integer(), None);
        assert_eq!(EventValue::Float(f64::INFINITY).as_integer(), None);
    }

    #[test]
    fn text_value_parses_integer_then_float() {
        assert_eq!(EventValue::from("42").as_integer(), Some(42));
        assert_eq!(EventValue::from(" 12.5 ").as_integer(), Some(12));
        assert_eq!(EventValue::from("abc").as_integer(), None);
        assert_eq!(EventValue::from("NaN").as_integer(), None);
        assert_eq!(EventValue::from("").as_integer(), None);
    }

    #[test]
    fn value_deserializes_from_any_numeric_wire_form() {
        let e: RawEvent = serde_json::from_str(r#"{"kind":"click","value":15}"#).unwrap();
        assert_eq!(e.value, EventValue::Integer(15));

        let e: RawEvent = serde_json::from_str(r#"{"kind":"click","value":15.5}"#).unwrap();
        assert_eq!(e.value, EventValue::Float(15.5));

        let e: RawEvent = serde_json::from_str(r#"{"kind":"click","value":"15"}"#).unwrap();
        assert_eq!(e.value, EventValue::Text("15".to_string()));
    }

    #[test]
    fn non_numeric_wire_values_still_decode() {
        for (json, expected) in [
            (r#"{"kind":"click","value":true}"#, serde_json::Value::Bool(true)),
            (r#"{"kind":"click","value":null}"#, serde_json::Value::Null),
            (r#"{"kind":"click","value":[1]}"#, serde_json::json!([1])),
            (r#"{"kind":"click","value":{"n":1}}"#, serde_json::json!({"n": 1})),
        ] {
            let e: RawEvent = serde_json::from_str(json).unwrap();
            assert_eq!(e.value, EventValue::Other(expected));
            assert_eq!(e.value.as_integer(), None);
        }
    }

    #[test]
    fn non_numeric_wire_values_decode_from_msgpack() {
        let bytes = rmp_serde::to_vec_named(&serde_json::json!({"kind":"click","value":false}))
            .unwrap();
        let e: RawEvent = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(e.value, EventValue::Other(serde_json::Value::Bool(false)));

        let bytes = rmp_serde::to_vec_named(&serde_json::json!({"kind":"click","value":null}))
            .unwrap();
        let e: RawEvent = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(e.value.as_integer(), None);
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let e: RawEvent =
            serde_json::from_str(r#"{"type":"purchase","value":20,"user":"u-1","sequence":7}"#)
                .unwrap();
        assert_eq!(e.kind, "purchase");
        assert_eq!(e.payload, "u-1");
        assert_eq!(e.sequence, 7);
        assert_eq!(e.timestamp, 0);
    }

    #[test]
    fn enriched_event_accepts_legacy_tag_fields() {
        let json = r#"{"event":{"kind":"click","value":11},"metadata":{"rule":"x"},"passedRules":true}"#;
        let e: EnrichedEvent = serde_json::from_str(json).unwrap();
        assert!(e.passed);
        assert_eq!(e.tag("rule"), Some("x"));
    }

    #[test]
    fn work_item_kind_is_detected() {
        assert!(RawEvent::new(WORK_ITEM_KIND, 0_i64, "{}").is_work_item());
        assert!(!RawEvent::new("click", 0_i64, "").is_work_item());
    }
}
