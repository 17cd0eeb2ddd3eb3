// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for event-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `event_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `mode`: foreground, background
//! - `operation`: name passed to [`crate::resilience::retry::retry`]
//! - `status`: success, error, exhausted, discarded
//! - `outcome`: fresh, stale, miss, corrupt, expired, error (cache loads)

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record one attempt of a retried operation
pub fn record_attempt(operation: &str, status: &str) {
    counter!(
        "event_sync_attempts_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record how a whole fetch (all attempts) ended
pub fn record_fetch_result(mode: &str, status: &str) {
    counter!(
        "event_sync_fetches_total",
        "mode" => mode.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record fetch latency (all attempts, including backoff)
pub fn record_fetch_latency(mode: &str, duration: Duration) {
    histogram!(
        "event_sync_fetch_seconds",
        "mode" => mode.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a fetch request folded into one already in flight
pub fn record_fetch_coalesced() {
    counter!("event_sync_fetch_coalesced_total").increment(1);
}

/// Record a cache load outcome
pub fn record_cache_load(outcome: &str) {
    counter!(
        "event_sync_cache_loads_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a cache write
pub fn record_cache_write(success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        "event_sync_cache_writes_total",
        "status" => status
    )
    .increment(1);
}

/// Record a merged notification
pub fn record_merge(kind: &str, outcome: &str) {
    counter!(
        "event_sync_merges_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a notification dropped as malformed
pub fn record_notification_dropped() {
    counter!("event_sync_notifications_dropped_total").increment(1);
}

/// Set current collection length
pub fn set_collection_size(count: usize) {
    gauge!("event_sync_collection_items").set(count as f64);
}

/// Set whether the real-time stream is attached (1) or not (0)
pub fn set_realtime_attached(attached: bool) {
    gauge!("event_sync_realtime_attached").set(if attached { 1.0 } else { 0.0 });
}

/// Track controller phase transitions
pub fn set_engine_phase(phase: &str) {
    counter!(
        "event_sync_phase_transitions_total",
        "phase" => phase.to_string()
    )
    .increment(1);
}

/// Timer that records fetch latency on drop
pub struct LatencyTimer {
    mode: &'static str,
    start: Instant,
}

impl LatencyTimer {
    #[must_use]
    pub fn new(mode: &'static str) -> Self {
        Self {
            mode,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_fetch_latency(self.mode, self.start.elapsed());
    }
}
