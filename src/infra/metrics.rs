//! Lock-free metrics collection and periodic reporting
//!
//! Counters are bumped from the ingestion task and HTTP handlers.
//!
//! NOTE: Relaxed ordering throughout. These are statistics only; nothing
//! reads them to make decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Lock-free metrics collector
pub struct Metrics {
    /// Inbound publish packets seen by the ingestion task (monotonic)
    messages_received: AtomicU64,
    /// Readings applied to the store (monotonic)
    readings_applied: AtomicU64,
    /// Messages dropped because payload or topic could not be decoded (monotonic)
    decode_errors: AtomicU64,
    /// Messages whose topic fell back to the unknown intersection (monotonic)
    unknown_topics: AtomicU64,
    /// Overrides applied via the control surface (monotonic)
    overrides_applied: AtomicU64,
    /// Snapshot reads served (monotonic)
    snapshots_served: AtomicU64,
    /// Readings applied since last report (reset on report)
    readings_since_report: AtomicU64,
    last_report: parking_lot::Mutex<Instant>,
}

/// Point-in-time metrics values
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub messages_received: u64,
    pub readings_applied: u64,
    pub decode_errors: u64,
    pub unknown_topics: u64,
    pub overrides_applied: u64,
    pub snapshots_served: u64,
    pub readings_per_sec: f64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            messages_received = %self.messages_received,
            readings_applied = %self.readings_applied,
            readings_per_sec = %format!("{:.2}", self.readings_per_sec),
            decode_errors = %self.decode_errors,
            unknown_topics = %self.unknown_topics,
            overrides_applied = %self.overrides_applied,
            snapshots_served = %self.snapshots_served,
            "metrics"
        );
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            readings_applied: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            unknown_topics: AtomicU64::new(0),
            overrides_applied: AtomicU64::new(0),
            snapshots_served: AtomicU64::new(0),
            readings_since_report: AtomicU64::new(0),
            last_report: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reading_applied(&self) {
        self.readings_applied.fetch_add(1, Ordering::Relaxed);
        self.readings_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unknown_topic(&self) {
        self.unknown_topics.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_override_applied(&self) {
        self.overrides_applied.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_snapshot_served(&self) {
        self.snapshots_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters without resetting the rate window
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            readings_applied: self.readings_applied.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            unknown_topics: self.unknown_topics.load(Ordering::Relaxed),
            overrides_applied: self.overrides_applied.load(Ordering::Relaxed),
            snapshots_served: self.snapshots_served.load(Ordering::Relaxed),
            readings_per_sec: 0.0,
        }
    }

    /// Generate a summary and reset the per-interval rate window
    pub fn report(&self) -> MetricsSummary {
        let elapsed = {
            let mut last = self.last_report.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };
        let readings = self.readings_since_report.swap(0, Ordering::Relaxed);
        let secs = elapsed.as_secs_f64();

        MetricsSummary {
            readings_per_sec: if secs > 0.0 { readings as f64 / secs } else { 0.0 },
            ..self.summary()
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
