// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Scheduler state types.
//!
//! # Lifecycle
//!
//! ```text
//!            start()              stop()
//! Created ────────────→ Running ────────────→ Stopped
//!    │                                           ↑
//!    └──────────── (start/stop again) ───────────┘ InvalidState error
//! ```
//!
//! # Session Phases
//!
//! ```text
//!         trigger
//! Idle ───────────→ Fetching ──→ Detecting ──┬──(no conflicts)────────────┐
//!  ↑                   │             │       │                            ↓
//!  │                   │             │       ├──(auto)──→ Resolving ──→ Persisting
//!  │                   │             │       │                            ↑    │
//!  │                   │             │       └──(manual)─→ ConflictPending┘    │
//!  │                   ↓             ↓                     resolve_next()      │
//!  └────────────────── Error ←───────────────────────────────────────────────┘
//!                         (any failure; always returns to Idle)
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Lifecycle state of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    /// Constructed; timer not running. Manual triggers work.
    Created,
    /// Periodic timer running.
    Running,
    /// Stopped for good. Triggers fail with `Shutdown`.
    Stopped,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Created => write!(f, "Created"),
            SchedulerState::Running => write!(f, "Running"),
            SchedulerState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Phase of the current sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncPhase {
    Idle,
    Fetching,
    Detecting,
    Resolving,
    /// Waiting for the caller to resolve queued conflicts.
    ConflictPending,
    Persisting,
    /// Transient; the session has failed and is returning to `Idle`.
    Error,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncPhase::Idle => "Idle",
            SyncPhase::Fetching => "Fetching",
            SyncPhase::Detecting => "Detecting",
            SyncPhase::Resolving => "Resolving",
            SyncPhase::ConflictPending => "ConflictPending",
            SyncPhase::Persisting => "Persisting",
            SyncPhase::Error => "Error",
        };
        f.write_str(s)
    }
}

/// What started a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Timer,
    Manual,
    Reconnect,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Timer => "timer",
            SyncTrigger::Manual => "manual",
            SyncTrigger::Reconnect => "reconnect",
        }
    }
}

impl std::fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a completed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub trigger: SyncTrigger,
    /// Items the remote returned.
    pub received: usize,
    /// Items that passed ingestion validation.
    pub accepted: usize,
    pub conflicts: usize,
    pub resolved: usize,
    pub added: usize,
    pub unchanged: usize,
    pub duration: Duration,
    pub completed_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn summary(&self) -> String {
        match (self.added, self.resolved) {
            (0, 0) => "Sync complete, everything up to date".to_string(),
            (added, 0) => format!("Sync complete, {} new quote(s) from server", added),
            (0, resolved) => format!("Sync complete, {} conflict(s) resolved", resolved),
            (added, resolved) => format!(
                "Sync complete, {} new quote(s) from server, {} conflict(s) resolved",
                added, resolved
            ),
        }
    }
}

/// Result of a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Session ran to completion.
    Completed(SyncReport),
    /// Conflicts are queued; call `resolve_next()` for each.
    ConflictPending { conflicts: usize },
    /// Another session is in progress.
    Skipped,
    /// Connectivity is down; nothing was fetched.
    Offline,
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Result of resolving one queued conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// More conflicts remain.
    Pending { remaining: usize, message: String },
    /// Queue drained and the session persisted.
    Completed(SyncReport),
}

/// Persisted sync counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounters {
    pub sync_count: u64,
    pub conflicts_resolved: u64,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Point-in-time snapshot for health endpoints and UIs.
///
/// Collected from atomics, watch channels and the store lock. No remote I/O.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub phase: SyncPhase,
    pub in_progress: bool,
    pub pending_conflicts: usize,
    pub online: bool,
    pub record_count: usize,
    pub counters: SyncCounters,
}
