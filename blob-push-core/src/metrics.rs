//! Metrics sinks: a `tracing`-backed sink for the CLI and an in-memory counter sink.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tracing::info;

use crate::contract::MetricsSink;

/// Recorded once per finished upload, successful or not.
pub const UPLOAD_EVENT: &str = "blob_upload_completed";
/// Recorded once per failed upload, in addition to [`UPLOAD_EVENT`].
pub const UPLOAD_FAILED_EVENT: &str = "blob_upload_failed";

/// Emits every record as a structured event on the `metrics` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn record(&self, event_code: &str, count: u64) {
        info!(target: "metrics", event_code, count, "metric recorded");
    }

    fn record_duration(&self, event_code: &str, elapsed: Duration) {
        info!(
            target: "metrics",
            event_code,
            elapsed_ms = elapsed.as_millis() as u64,
            "timing recorded"
        );
    }
}

/// Accumulates counts and durations per event code.
#[derive(Debug, Default)]
pub struct CountingMetrics {
    counts: Mutex<HashMap<String, u64>>,
    timings: Mutex<HashMap<String, Vec<Duration>>>,
}

impl CountingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, event_code: &str) -> u64 {
        self.counts
            .lock()
            .map(|counts| counts.get(event_code).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn timings(&self, event_code: &str) -> Vec<Duration> {
        self.timings
            .lock()
            .map(|timings| timings.get(event_code).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl MetricsSink for CountingMetrics {
    fn record(&self, event_code: &str, count: u64) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry(event_code.to_string()).or_insert(0) += count;
        }
    }

    fn record_duration(&self, event_code: &str, elapsed: Duration) {
        if let Ok(mut timings) = self.timings.lock() {
            timings
                .entry(event_code.to_string())
                .or_default()
                .push(elapsed);
        }
    }
}
