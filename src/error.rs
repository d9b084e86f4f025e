// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the quote sync engine.
//!
//! Every failure the engine can surface is a variant of [`QuoteSyncError`].
//! Each variant maps to a stable, machine-distinguishable [`ErrorKind`] that
//! is forwarded to the notification sink alongside the human message.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Validation` | No | Bad add/update/import input, nothing changed |
//! | `Persistence` | Yes | KV write failed, in-memory mutation stands |
//! | `Fetch` | Yes | Remote unreachable, bad response, timeout, circuit open |
//! | `Sync` | Depends | Session-level failure wrapping one of the above |
//! | `Config` | No | Configuration invalid |
//! | `InvalidState` | No | Scheduler lifecycle or session misuse |
//! | `Shutdown` | No | Scheduler has been stopped |
//! | `Internal` | No | Serialization or unexpected internal error |
//!
//! # Retry Behavior
//!
//! Retryable errors are never retried inside a session. A failed session is
//! terminal; the next timer tick or manual trigger starts a fresh one.

use serde::Serialize;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, QuoteSyncError>;

/// Stable error classification, safe to match on or ship over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Persistence,
    Fetch,
    Sync,
    Config,
    InvalidState,
    Shutdown,
    Internal,
}

impl ErrorKind {
    /// Stable snake_case identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Persistence => "persistence",
            Self::Fetch => "fetch",
            Self::Sync => "sync",
            Self::Config => "config",
            Self::InvalidState => "invalid_state",
            Self::Shutdown => "shutdown",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the store or during a sync session.
#[derive(Error, Debug)]
pub enum QuoteSyncError {
    /// Input rejected before any state change.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Durable storage write failed.
    ///
    /// The in-memory mutation that triggered the write is kept. The store
    /// stays dirty until a later write or `flush()` succeeds.
    #[error("Persistence error ({key}): {message}")]
    Persistence { key: String, message: String },

    /// Remote fetch failed. No store mutation happened.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// A sync session failed in the given phase.
    #[error("Sync failed during {phase}: {source}")]
    Sync {
        phase: String,
        #[source]
        source: Box<QuoteSyncError>,
    },

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation attempted in the wrong state
    /// (e.g. `resolve_next()` with no pending conflicts).
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// The scheduler has been stopped.
    #[error("Shutdown in progress")]
    Shutdown,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QuoteSyncError {
    /// Create a persistence error for a storage key.
    pub fn persistence(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persistence {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Wrap an error as a session failure in `phase`.
    pub fn sync(phase: impl Into<String>, source: QuoteSyncError) -> Self {
        Self::Sync {
            phase: phase.into(),
            source: Box::new(source),
        }
    }

    /// Stable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Persistence { .. } => ErrorKind::Persistence,
            Self::Fetch(_) => ErrorKind::Fetch,
            Self::Sync { .. } => ErrorKind::Sync,
            Self::Config(_) => ErrorKind::Config,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Shutdown => ErrorKind::Shutdown,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Kind of the innermost error, looking through `Sync` wrappers.
    pub fn root_kind(&self) -> ErrorKind {
        match self {
            Self::Sync { source, .. } => source.root_kind(),
            other => other.kind(),
        }
    }

    /// Check if a later attempt could succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Persistence { .. } => true,
            Self::Fetch(_) => true,
            Self::Sync { source, .. } => source.is_retryable(),
            Self::Validation(_) => false,
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
            Self::Shutdown => false,
            Self::Internal(_) => false,
        }
    }
}

impl From<serde_json::Error> for QuoteSyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("serialization: {}", e))
    }
}
