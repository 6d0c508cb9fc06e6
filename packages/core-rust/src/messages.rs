//! Stream frames for the event and batch endpoints, plus their codec.
//!
//! Frames travel either as JSON text or as named `MsgPack`
//! (`rmp_serde::to_vec_named`), both with camelCase field names.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::event::{EnrichedEvent, RawEvent};

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// One inbound item in event mode. `event` may be absent on malformed framing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApplyRulesRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<RawEvent>,
}

impl From<RawEvent> for ApplyRulesRequest {
    fn from(event: RawEvent) -> Self {
        Self { event: Some(event) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyRulesResponse {
    pub event: EnrichedEvent,
}

/// One inbound arrival group in batch mode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApplyRulesBatchRequest {
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

impl From<Vec<RawEvent>> for ApplyRulesBatchRequest {
    fn from(events: Vec<RawEvent>) -> Self {
        Self { events }
    }
}

/// Survivors of one batch. Never sent empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyRulesBatchResponse {
    pub events: Vec<EnrichedEvent>,
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Encoding used for outbound frames on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Json,
    MsgPack,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("msgpack encode: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),
    #[error("msgpack decode: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
}

/// An encoded frame, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedFrame {
    Text(String),
    Binary(Vec<u8>),
}

impl WireFormat {
    /// Encodes a frame in this format.
    ///
    /// # Errors
    ///
    /// Returns a `CodecError` if serialization fails.
    pub fn encode<T: Serialize>(self, frame: &T) -> Result<EncodedFrame, CodecError> {
        Ok(match self {
            Self::Json => EncodedFrame::Text(serde_json::to_string(frame)?),
            Self::MsgPack => EncodedFrame::Binary(rmp_serde::to_vec_named(frame)?),
        })
    }
}

/// Decodes a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Json` on malformed input.
pub fn decode_text<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    Ok(serde_json::from_str(text)?)
}

/// Decodes a named `MsgPack` binary frame.
///
/// # Errors
///
/// Returns `CodecError::MsgPackDecode` on malformed input.
pub fn decode_binary<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventValue;

    #[test]
    fn request_without_event_decodes_to_none() {
        let req: ApplyRulesRequest = decode_text("{}").unwrap();
        assert!(req.event.is_none());
    }

    #[test]
    fn msgpack_request_keeps_value_representation() {
        let frame = ApplyRulesBatchRequest::from(vec![
            RawEvent::new("click", 15_i64, ""),
            RawEvent::new("click", 2.5_f64, ""),
            RawEvent::new("click", "7", ""),
        ]);
        let EncodedFrame::Binary(bytes) = WireFormat::MsgPack.encode(&frame).unwrap() else {
            panic!("msgpack must produce a binary frame");
        };
        let decoded: ApplyRulesBatchRequest = decode_binary(&bytes).unwrap();
        let values: Vec<_> = decoded.events.into_iter().map(|e| e.value).collect();
        assert_eq!(
            values,
            vec![
                EventValue::Integer(15),
                EventValue::Float(2.5),
                EventValue::Text("7".to_string()),
            ]
        );
    }

    #[test]
    fn json_encoding_uses_camel_case_names() {
        let frame = ApplyRulesRequest::from(RawEvent::new("click", 1_i64, "x").with_sequence(3));
        let EncodedFrame::Text(text) = WireFormat::Json.encode(&frame).unwrap() else {
            panic!("json must produce a text frame");
        };
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["event"]["kind"], "click");
        assert_eq!(json["event"]["sequence"], 3);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(decode_text::<ApplyRulesRequest>("[1,2").is_err());
        assert!(decode_binary::<ApplyRulesRequest>(&[0xc1]).is_err());
    }

    #[test]
    fn wire_format_parses_lowercase_names() {
        let f: WireFormat = serde_json::from_str("\"msgpack\"").unwrap();
        assert_eq!(f, WireFormat::MsgPack);
        assert_eq!(WireFormat::default(), WireFormat::Json);
    }
}
