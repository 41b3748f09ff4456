//! Aggregation store - authoritative per-intersection state
//!
//! The map itself sits behind a `RwLock` that is only write-locked to insert
//! a never-seen intersection. Each `IntersectionState` has its own `Mutex`,
//! so mutations of different intersections never wait on one another and a
//! snapshot never observes a half-applied update of any single entry.

use crate::domain::topic::intersection_or_unknown;
use crate::domain::types::{epoch_ms, CountMessage, IntersectionState, Override, Reading};
use crate::infra::error::DecodeError;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable point-in-time copy of every intersection, ordered by id
pub type Snapshot = BTreeMap<String, IntersectionState>;

/// Result of a successfully applied reading
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedReading {
    pub reading: Reading,
    /// Topic was malformed and the reading was filed under `unknown`
    pub unknown_topic: bool,
}

type Entry = Arc<Mutex<IntersectionState>>;

pub struct AggregationStore {
    topic_prefix: String,
    entries: RwLock<FxHashMap<String, Entry>>,
}

impl AggregationStore {
    pub fn new(topic_prefix: impl Into<String>) -> Self {
        Self { topic_prefix: topic_prefix.into(), entries: RwLock::new(FxHashMap::default()) }
    }

    pub fn topic_prefix(&self) -> &str {
        &self.topic_prefix
    }

    /// Get the entry for `id`, creating it on first reference
    fn entry(&self, id: &str) -> Entry {
        if let Some(entry) = self.entries.read().get(id) {
            return entry.clone();
        }
        self.entries.write().entry(id.to_string()).or_default().clone()
    }

    /// Decode a channel message and replace the intersection's latest reading
    ///
    /// A malformed payload leaves all state untouched and is returned as a
    /// `DecodeError` for the caller to log and drop.
    pub fn apply_reading(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Result<AppliedReading, DecodeError> {
        self.apply_reading_at(topic, payload, epoch_ms())
    }

    pub(crate) fn apply_reading_at(
        &self,
        topic: &str,
        payload: &[u8],
        now_ms: u64,
    ) -> Result<AppliedReading, DecodeError> {
        let (intersection, unknown_topic) = intersection_or_unknown(&self.topic_prefix, topic);

        if std::str::from_utf8(payload).is_err() {
            return Err(DecodeError::InvalidUtf8 { intersection });
        }
        let message = match CountMessage::decode(payload) {
            Ok(m) => m,
            Err(source) => return Err(DecodeError::Malformed { intersection, source }),
        };

        let entry = self.entry(&intersection);
        let mut state = entry.lock();

        // Arrival time never goes backwards for one intersection
        let observed_at = match &state.latest_reading {
            Some(prev) => now_ms.max(prev.observed_at),
            None => now_ms,
        };
        let reading = Reading {
            intersection_id: intersection,
            count: message.count,
            observed_at,
            sensor_ts: message.ts,
        };
        state.latest_reading = Some(reading.clone());

        Ok(AppliedReading { reading, unknown_topic })
    }

    /// Unconditionally replace the active override for an intersection
    pub fn apply_override(
        &self,
        intersection_id: &str,
        action: &str,
        issued_by: &str,
        notes: Option<String>,
    ) -> Override {
        let ovr = Override {
            intersection_id: intersection_id.to_string(),
            action: action.to_string(),
            issued_by: issued_by.to_string(),
            issued_at: epoch_ms(),
            notes,
        };

        let entry = self.entry(intersection_id);
        entry.lock().active_override = Some(ovr.clone());
        ovr
    }

    /// Copy of the whole map; each entry is cloned under its own lock
    pub fn snapshot(&self) -> Snapshot {
        let entries = self.entries.read();
        entries.iter().map(|(id, entry)| (id.clone(), entry.lock().clone())).collect()
    }

    /// Copy of a single intersection's state
    pub fn get(&self, intersection_id: &str) -> Option<IntersectionState> {
        let entry = self.entries.read().get(intersection_id).cloned()?;
        let state = entry.lock().clone();
        Some(state)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    const PREFIX: &str = "puthisaalai";

    fn payload(count: u32) -> Vec<u8> {
        format!(r#"{{"intersection":"A","count":{count},"ts":1700000000.5}}"#).into_bytes()
    }

    #[test]
    fn test_last_applied_reading_wins() {
        let store = AggregationStore::new(PREFIX);
        for count in [3, 9, 1, 14, 2] {
            store.apply_reading("puthisaalai/A/counts", &payload(count)).unwrap();
        }
        let snap = store.snapshot();
        assert_eq!(snap.len(), 1);
        let reading = snap["A"].latest_reading.as_ref().unwrap();
        assert_eq!(reading.count, 2);
        assert_eq!(reading.intersection_id, "A");
        assert_eq!(reading.sensor_ts, Some(1700000000.5));
    }

    #[test]
    fn test_observed_at_never_decreases() {
        let store = AggregationStore::new(PREFIX);
        store.apply_reading_at("puthisaalai/A/counts", &payload(1), 5_000).unwrap();
        let applied = store.apply_reading_at("puthisaalai/A/counts", &payload(2), 4_000).unwrap();

        assert_eq!(applied.reading.count, 2, "later application still wins");
        assert_eq!(applied.reading.observed_at, 5_000);

        let applied = store.apply_reading_at("puthisaalai/A/counts", &payload(3), 6_000).unwrap();
        assert_eq!(applied.reading.observed_at, 6_000);
    }

    #[test]
    fn test_malformed_payload_leaves_state_unchanged() {
        let store = AggregationStore::new(PREFIX);
        store.apply_reading("puthisaalai/A/counts", &payload(12)).unwrap();
        let before = store.get("A").unwrap();

        let err = store.apply_reading("puthisaalai/A/counts", b"{not json").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
        assert_eq!(err.intersection(), "A");

        let err = store.apply_reading("puthisaalai/A/counts", &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidUtf8 { .. }));

        let err = store.apply_reading("puthisaalai/A/counts", br#"{"count":-4}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));

        assert_eq!(store.get("A").unwrap(), before);
    }

    #[test]
    fn test_reading_with_string_ts_is_applied() {
        let store = AggregationStore::new(PREFIX);
        let body = br#"{"intersection":"A","count":3,"ts":"2024-05-01T10:00:00Z"}"#;
        let applied = store.apply_reading("puthisaalai/A/counts", body).unwrap();
        assert_eq!(applied.reading.count, 3);
        assert!(applied.reading.sensor_ts.is_none());
    }

    #[test]
    fn test_reading_with_numeric_intersection_is_applied() {
        let store = AggregationStore::new(PREFIX);
        let body = br#"{"intersection":7,"count":3,"ts":1700000000.5}"#;
        store.apply_reading("puthisaalai/A/counts", body).unwrap();
        let reading = store.get("A").unwrap().latest_reading.unwrap();
        assert_eq!(reading.count, 3);
        assert_eq!(reading.intersection_id, "A");
        assert_eq!(reading.sensor_ts, Some(1700000000.5));
    }

    #[test]
    fn test_reading_with_boolean_ts_is_applied() {
        let store = AggregationStore::new(PREFIX);
        let body = br#"{"intersection":"A","count":3,"ts":true}"#;
        store.apply_reading("puthisaalai/A/counts", body).unwrap();
        assert_eq!(store.get("A").unwrap().latest_reading.unwrap().count, 3);
    }

    #[test]
    fn test_malformed_payload_for_new_intersection_creates_nothing() {
        let store = AggregationStore::new(PREFIX);
        assert!(store.apply_reading("puthisaalai/B/counts", b"[]").is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_malformed_topic_falls_back_to_unknown() {
        let store = AggregationStore::new(PREFIX);
        let applied = store.apply_reading("elsewhere", &payload(4)).unwrap();
        assert!(applied.unknown_topic);
        assert_eq!(applied.reading.intersection_id, "unknown");
        assert_eq!(store.get("unknown").unwrap().latest_reading.unwrap().count, 4);
    }

    #[test]
    fn test_topic_segment_is_authoritative() {
        let store = AggregationStore::new(PREFIX);
        // Payload claims "A" but the topic routes it to "C"
        store.apply_reading("puthisaalai/C/counts", &payload(8)).unwrap();
        assert!(store.get("A").is_none());
        assert_eq!(store.get("C").unwrap().latest_reading.unwrap().count, 8);
    }

    #[test]
    fn test_override_and_reading_are_independent() {
        let store = AggregationStore::new(PREFIX);
        store.apply_reading("puthisaalai/A/counts", &payload(12)).unwrap();
        let reading = store.get("A").unwrap().latest_reading;

        store.apply_override("A", "divert", "police", Some("procession".to_string()));
        let state = store.get("A").unwrap();
        assert_eq!(state.latest_reading, reading);
        assert_eq!(state.active_override.as_ref().unwrap().action, "divert");

        let ovr = state.active_override.clone();
        store.apply_reading("puthisaalai/A/counts", &payload(30)).unwrap();
        let state = store.get("A").unwrap();
        assert_eq!(state.active_override, ovr);
        assert_eq!(state.latest_reading.unwrap().count, 30);
    }

    #[test]
    fn test_override_replaces_prior_and_creates_lazily() {
        let store = AggregationStore::new(PREFIX);
        store.apply_override("Z", "hold", "police", None);
        store.apply_override("Z", "clear", "traffic-ops", None);

        let state = store.get("Z").unwrap();
        assert!(state.latest_reading.is_none());
        let ovr = state.active_override.unwrap();
        assert_eq!(ovr.action, "clear");
        assert_eq!(ovr.issued_by, "traffic-ops");
        assert!(ovr.issued_at > 0);
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let store = AggregationStore::new(PREFIX);
        store.apply_reading("puthisaalai/A/counts", &payload(1)).unwrap();
        let snap = store.snapshot();
        store.apply_reading("puthisaalai/A/counts", &payload(2)).unwrap();
        store.apply_override("B", "hold", "police", None);

        assert_eq!(snap.len(), 1);
        assert_eq!(snap["A"].latest_reading.as_ref().unwrap().count, 1);
    }

    #[test]
    fn test_override_on_other_intersection_not_blocked_by_held_entry() {
        let store = Arc::new(AggregationStore::new(PREFIX));
        store.apply_override("X", "hold", "police", None);
        store.apply_override("Y", "hold", "police", None);

        // Hold X's entry lock for the duration of the test
        let x_entry = store.entry("X");
        let _x_guard = x_entry.lock();

        let (tx, rx) = mpsc::channel();
        let worker_store = store.clone();
        thread::spawn(move || {
            worker_store.apply_override("Y", "divert", "police", None);
            worker_store.apply_override("NEW", "divert", "police", None);
            let _ = tx.send(());
        });

        rx.recv_timeout(Duration::from_secs(2))
            .expect("override on unrelated intersection must not wait on X");
        assert_eq!(store.get("Y").unwrap().active_override.unwrap().action, "divert");
        assert!(store.get("NEW").is_some());
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let store = Arc::new(AggregationStore::new(PREFIX));
        let mut handles = Vec::new();

        // Single ingestion-style writer
        let ingest = store.clone();
        handles.push(thread::spawn(move || {
            for i in 0..500u32 {
                let id = ["A", "B", "C"][(i % 3) as usize];
                let topic = format!("puthisaalai/{id}/counts");
                ingest.apply_reading(&topic, &payload(i)).unwrap();
            }
        }));

        for t in 0..4 {
            let s = store.clone();
            handles.push(thread::spawn(move || {
                for i in 0..200 {
                    let id = format!("I{}", (t * 200 + i) % 7);
                    s.apply_override(&id, "hold", "police", None);
                    let snap = s.snapshot();
                    for state in snap.values() {
                        if let Some(ovr) = &state.active_override {
                            assert_eq!(ovr.action, "hold");
                        }
                    }
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let snap = store.snapshot();
        assert_eq!(snap.len(), 3 + 7);
        assert_eq!(snap["A"].latest_reading.as_ref().unwrap().count, 498);
        assert_eq!(snap["B"].latest_reading.as_ref().unwrap().count, 499);
        assert_eq!(snap["C"].latest_reading.as_ref().unwrap().count, 497);
    }
}
