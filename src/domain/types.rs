//! Shared types for intersection telemetry

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Get current epoch seconds with sub-second precision (wire `ts` format)
#[inline]
pub fn epoch_secs_f64() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

/// Identity used when a topic does not carry a usable intersection segment
pub const UNKNOWN_INTERSECTION: &str = "unknown";

/// One sensor-reported vehicle count for an intersection.
///
/// Immutable once created; a later Reading for the same intersection
/// replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub intersection_id: String,
    pub count: u32,
    /// Store arrival time (epoch ms)
    pub observed_at: u64,
    /// Timestamp stamped by the sensing agent, if it sent one (epoch seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_ts: Option<f64>,
}

/// Operator-issued control directive for an intersection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Override {
    pub intersection_id: String,
    /// Free-form token such as "divert", "hold" or "clear"
    pub action: String,
    pub issued_by: String,
    /// Epoch ms
    pub issued_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Per-intersection state held by the aggregation store
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntersectionState {
    pub latest_reading: Option<Reading>,
    pub active_override: Option<Override>,
}

/// Wire payload published by sensing agents on `<prefix>/<id>/counts`
///
/// `intersection` is informational; the topic segment is authoritative.
/// Only `count` is required: `intersection` and `ts` of an unexpected type
/// decode as absent instead of rejecting the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountMessage {
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub intersection: Option<String>,
    pub count: u32,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub ts: Option<f64>,
}

/// Any JSON value is accepted; one that does not fit `T` becomes `None`
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

impl CountMessage {
    /// Build a message stamped with the current wall-clock time
    pub fn now(intersection: &str, count: u32) -> Self {
        Self { intersection: Some(intersection.to_string()), count, ts: Some(epoch_secs_f64()) }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// Connection state of a supervised transport link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

impl LinkStatus {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Connected => "connected",
            LinkStatus::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_message_round_trip() {
        let msg = CountMessage { intersection: Some("A".to_string()), count: 12, ts: Some(1.5e9) };
        let bytes = msg.encode().unwrap();
        let decoded = CountMessage::decode(&bytes).unwrap();
        assert_eq!(decoded.count, 12);
        assert_eq!(decoded.intersection.as_deref(), Some("A"));
    }

    #[test]
    fn test_decode_count_only() {
        let decoded = CountMessage::decode(br#"{"count": 7}"#).unwrap();
        assert_eq!(decoded.count, 7);
        assert!(decoded.intersection.is_none());
        assert!(decoded.ts.is_none());
    }

    #[test]
    fn test_decode_rejects_negative_and_missing_count() {
        assert!(CountMessage::decode(br#"{"count": -3}"#).is_err());
        assert!(CountMessage::decode(br#"{"intersection": "A"}"#).is_err());
        assert!(CountMessage::decode(b"not json").is_err());
    }

    #[test]
    fn test_decode_ignores_mistyped_optional_fields() {
        let decoded =
            CountMessage::decode(br#"{"intersection":"A","count":3,"ts":"2024-05-01T10:00:00Z"}"#)
                .unwrap();
        assert_eq!(decoded.count, 3);
        assert_eq!(decoded.intersection.as_deref(), Some("A"));
        assert!(decoded.ts.is_none());

        let decoded = CountMessage::decode(br#"{"intersection":7,"count":4,"ts":true}"#).unwrap();
        assert_eq!(decoded.count, 4);
        assert!(decoded.intersection.is_none());
        assert!(decoded.ts.is_none());

        let decoded = CountMessage::decode(br#"{"intersection":null,"count":5,"ts":12}"#).unwrap();
        assert!(decoded.intersection.is_none());
        assert_eq!(decoded.ts, Some(12.0));
    }

    #[test]
    fn test_wire_field_names() {
        let msg = CountMessage::now("B", 3);
        let value: serde_json::Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["intersection"], "B");
        assert_eq!(value["count"], 3);
        assert!(value["ts"].as_f64().unwrap() > 1.0e9);
    }
}
