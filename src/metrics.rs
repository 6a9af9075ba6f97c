//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Endpoint connection attempts
//! - Bulk scan progress
//! - Key copy outcomes and latency
//! - Capture feed throughput and parse failures
//! - Live actions applied, skipped, and unclassified verbs
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `replication_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! # Usage
//!
//! ```rust,no_run
//! use redis_replicator::metrics;
//! use std::time::Duration;
//!
//! // In the scanner after each SCAN reply
//! metrics::record_scan_batch(10);
//!
//! // In the replicator after a RESTORE
//! metrics::record_key_copied("scan", 512, Duration::from_millis(2));
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record an endpoint connection attempt outcome.
pub fn record_connection(endpoint: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("replication_connections_total", "endpoint" => endpoint.to_string(), "status" => status).increment(1);
}

/// Set the coordinator state gauge.
pub fn set_replicator_state(state: &str) {
    // One series per state, 1 for the current state
    for s in ["idle", "capture_started", "bulk_syncing", "steady_state", "stopped", "failed"] {
        let value = if s == state { 1.0 } else { 0.0 };
        gauge!("replication_state", "state" => s).set(value);
    }
}

/// Record one SCAN reply and the number of keys it returned.
pub fn record_scan_batch(keys: usize) {
    counter!("replication_scan_batches_total").increment(1);
    counter!("replication_scan_keys_total").increment(keys as u64);
}

/// Record completion of the initial bulk scan.
pub fn record_initial_sync_complete(keys_copied: u64, duration: Duration) {
    gauge!("replication_initially_synced").set(1.0);
    gauge!("replication_initial_sync_keys").set(keys_copied as f64);
    histogram!("replication_initial_sync_duration_seconds").record(duration.as_secs_f64());
}

/// Record a key copied (DUMP/PTTL then RESTORE).
///
/// `origin` is `scan` or `live`.
pub fn record_key_copied(origin: &str, payload_bytes: usize, duration: Duration) {
    counter!("replication_keys_copied_total", "origin" => origin.to_string()).increment(1);
    histogram!("replication_copy_payload_bytes").record(payload_bytes as f64);
    histogram!("replication_copy_latency_seconds", "origin" => origin.to_string())
        .record(duration.as_secs_f64());
}

/// Record a key that vanished between being observed and being read.
pub fn record_key_vanished(origin: &str) {
    counter!("replication_keys_vanished_total", "origin" => origin.to_string()).increment(1);
}

/// Record a raw entry received from a capture feed.
pub fn record_capture_event(strategy: &str) {
    counter!("replication_capture_events_total", "strategy" => strategy.to_string()).increment(1);
}

/// Record a capture entry that failed to parse.
pub fn record_capture_parse_error(strategy: &str) {
    counter!("replication_capture_parse_errors_total", "strategy" => strategy.to_string()).increment(1);
}

/// Record a verb the classifier does not know.
pub fn record_classification_gap(strategy: &str) {
    counter!("replication_classification_gaps_total", "strategy" => strategy.to_string()).increment(1);
}

/// Record a live action applied to the destination.
pub fn record_action_applied(kind: &str, duration: Duration) {
    counter!("replication_actions_applied_total", "kind" => kind.to_string()).increment(1);
    histogram!("replication_action_latency_seconds", "kind" => kind.to_string())
        .record(duration.as_secs_f64());
}

/// Record a live action dropped under the log-and-skip policy.
pub fn record_live_error_skipped(kind: &str) {
    counter!("replication_live_errors_skipped_total", "kind" => kind.to_string()).increment(1);
}

/// Record a fatal error by category.
pub fn record_error(error_type: &str) {
    counter!("replication_errors_total", "error_type" => error_type.to_string()).increment(1);
}

/// Set the number of live actions waiting in the capture channel.
pub fn set_capture_backlog(depth: usize) {
    gauge!("replication_capture_backlog").set(depth as f64);
}
