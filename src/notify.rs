// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Status notifications.
//!
//! The scheduler reports every phase change a user would care about through
//! a [`StatusSink`]. Delivery is fire-and-forget: a sink cannot fail a
//! session, and a sink that panics is caught and logged.

use crate::error::{ErrorKind, QuoteSyncError};
use serde::Serialize;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// User-facing sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Success,
    Conflict,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Success => "success",
            Self::Conflict => "conflict",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub status: SyncStatus,
    pub message: String,
    /// Set for `error` notifications.
    pub error_kind: Option<ErrorKind>,
}

impl Notification {
    pub fn new(status: SyncStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error_kind: None,
        }
    }

    pub fn idle(message: impl Into<String>) -> Self {
        Self::new(SyncStatus::Idle, message)
    }

    pub fn syncing(message: impl Into<String>) -> Self {
        Self::new(SyncStatus::Syncing, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(SyncStatus::Success, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(SyncStatus::Conflict, message)
    }

    /// Error notification carrying the innermost error kind.
    pub fn error(err: &QuoteSyncError) -> Self {
        Self {
            status: SyncStatus::Error,
            message: err.to_string(),
            error_kind: Some(err.root_kind()),
        }
    }
}

/// Receiver of status notifications.
pub trait StatusSink: Send + Sync + 'static {
    fn notify(&self, notification: &Notification);
}

/// Sink that logs notifications through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn notify(&self, n: &Notification) {
        match n.status {
            SyncStatus::Error => {
                let kind = n.error_kind.map(|k| k.as_str()).unwrap_or("unknown");
                error!(status = %n.status, error_kind = kind, "{}", n.message)
            }
            SyncStatus::Conflict => warn!(status = %n.status, "{}", n.message),
            _ => info!(status = %n.status, "{}", n.message),
        }
    }
}

/// Sink that fans notifications out to any number of subscribers.
///
/// Slow subscribers lag and lose old notifications rather than blocking the
/// scheduler.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(64)
    }
}

impl StatusSink for BroadcastSink {
    fn notify(&self, n: &Notification) {
        // No subscribers is fine
        let _ = self.tx.send(n.clone());
    }
}

/// Deliver to `sink`, containing any panic.
pub(crate) fn deliver(sink: &dyn StatusSink, notification: &Notification) {
    let result = catch_unwind(AssertUnwindSafe(|| sink.notify(notification)));
    if result.is_err() {
        warn!(status = %notification.status, "Status sink panicked, notification dropped");
        crate::metrics::sink_panics_total();
    }
}
