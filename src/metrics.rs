// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Sync attempts, skips, completions and failures
//! - Conflicts detected and resolved
//! - Store mutations and persistence outcomes
//! - Scheduler state and session phase
//! - Fetch circuit breaker
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `quote_sync_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration)
//!
//! The crate only emits through the `metrics` facade. Installing an exporter
//! is up to the host application.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// =============================================================================
// Sync Session Metrics
// =============================================================================

/// Record a sync attempt by trigger (timer, manual, reconnect).
pub fn record_sync_attempt(trigger: &str) {
    counter!("quote_sync_attempts_total", "trigger" => trigger.to_string()).increment(1);
}

/// Record a trigger that did not start a session.
pub fn record_sync_skipped(reason: &str) {
    counter!("quote_sync_skipped_total", "reason" => reason.to_string()).increment(1);
}

/// Record a session that reached Persisting and finished.
pub fn record_sync_completed(duration: Duration) {
    counter!("quote_sync_completed_total").increment(1);
    histogram!("quote_sync_session_duration_seconds").record(duration.as_secs_f64());
}

/// Record a failed session by error kind.
pub fn record_sync_failed(error_kind: &str) {
    counter!("quote_sync_failed_total", "error_kind" => error_kind.to_string()).increment(1);
}

pub fn record_conflicts_detected(count: usize) {
    counter!("quote_sync_conflicts_detected_total").increment(count as u64);
}

/// Record a resolved conflict by strategy (server, local, merge, replace_all).
pub fn record_conflict_resolved(strategy: &str) {
    counter!("quote_sync_conflicts_resolved_total", "strategy" => strategy.to_string()).increment(1);
}

/// Record remote additions merged into the store.
pub fn record_records_added(count: usize) {
    if count > 0 {
        counter!("quote_sync_records_added_total").increment(count as u64);
    }
}

/// Records dropped at ingestion because they failed validation.
pub fn remote_records_rejected() {
    counter!("quote_sync_remote_records_rejected_total").increment(1);
}

// =============================================================================
// Store Metrics
// =============================================================================

/// Record a store mutation by operation name.
pub fn record_store_mutation(operation: &str) {
    counter!("quote_sync_store_mutations_total", "operation" => operation.to_string()).increment(1);
}

/// Record a persistence attempt.
pub fn record_persist(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("quote_sync_persists_total", "status" => status).increment(1);
}

pub fn set_record_count(count: usize) {
    gauge!("quote_sync_records").set(count as f64);
}

/// Record KV SQLite retry (for SQLITE_BUSY/SQLITE_LOCKED).
pub fn kv_retries_total(operation: &str) {
    counter!("quote_sync_kv_retries_total", "operation" => operation.to_string()).increment(1);
}

/// Record a notification dropped because the sink panicked.
pub fn sink_panics_total() {
    counter!("quote_sync_sink_panics_total").increment(1);
}

// =============================================================================
// Scheduler State
// =============================================================================

/// Gauge for scheduler lifecycle state (0=created, 1=running, 2=stopped).
pub fn set_scheduler_state(state: &str) {
    let value = match state {
        "Created" => 0.0,
        "Running" => 1.0,
        "Stopped" => 2.0,
        _ => -1.0,
    };
    gauge!("quote_sync_scheduler_state").set(value);
}

/// Gauge for the current session phase.
pub fn set_sync_phase(phase: &str) {
    let value = match phase {
        "Idle" => 0.0,
        "Fetching" => 1.0,
        "Detecting" => 2.0,
        "Resolving" => 3.0,
        "ConflictPending" => 4.0,
        "Persisting" => 5.0,
        "Error" => 6.0,
        _ => -1.0,
    };
    gauge!("quote_sync_phase").set(value);
}

// =============================================================================
// Circuit Breaker Metrics
// =============================================================================

/// Record circuit breaker call outcome.
pub fn record_circuit_call(circuit_name: &str, outcome: &str) {
    counter!(
        "quote_sync_circuit_calls_total",
        "circuit" => circuit_name.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record circuit breaker rejection (circuit was open).
pub fn record_circuit_rejection(circuit_name: &str) {
    counter!(
        "quote_sync_circuit_rejections_total",
        "circuit" => circuit_name.to_string()
    )
    .increment(1);
}
