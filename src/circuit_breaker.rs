// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Circuit breaker around the remote fetch.
//!
//! A remote that keeps failing is not hammered on every timer tick: after
//! `failure_threshold` failed fetches in a row the circuit opens and sessions
//! fail fast with a `Fetch` error until `recovery_timeout_sec` has passed.
//! Uses the `recloser` crate.
//!
//! # States
//!
//! - **Closed**: Normal operation, fetches pass through
//! - **Open**: Remote unhealthy, fetches rejected without being attempted
//! - **HalfOpen**: Trial fetches allowed; `success_threshold` successes close it
//!
//! # Usage
//!
//! ```rust,no_run
//! # use quote_sync::circuit_breaker::{CircuitBreaker, CircuitError};
//! # use quote_sync::config::CircuitConfig;
//! # async fn example() -> Result<(), CircuitError<String>> {
//! let circuit = CircuitBreaker::new("remote_fetch", &CircuitConfig::default());
//!
//! match circuit.call(|| async { Ok::<(), String>(()) }).await {
//!     Ok(()) => { /* success */ }
//!     Err(CircuitError::Rejected) => { /* circuit open, skip */ }
//!     Err(CircuitError::Inner(e)) => { /* remote error */ }
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::CircuitConfig;
use crate::error::{QuoteSyncError, Result};
use crate::remote::{RemoteRecord, RemoteSource};
use recloser::{AsyncRecloser, Error as RecloserError, Recloser};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Failure rate over the closed window that trips the circuit.
///
/// With a window of `failure_threshold` calls this means every call in the
/// window failed.
const TRIP_FAILURE_RATE: f32 = 0.99;

/// Error type for circuit-protected operations.
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The circuit breaker rejected the call (circuit is open).
    #[error("circuit breaker open, request rejected")]
    Rejected,

    /// The underlying operation failed.
    #[error("operation failed: {0}")]
    Inner(#[source] E),
}

impl<E> CircuitError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, CircuitError::Rejected)
    }

    pub fn inner(&self) -> Option<&E> {
        match self {
            CircuitError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// A named circuit breaker with call accounting.
pub struct CircuitBreaker {
    name: String,
    inner: AsyncRecloser,

    calls_total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &CircuitConfig) -> Self {
        let recloser = Recloser::custom()
            .error_rate(TRIP_FAILURE_RATE)
            .closed_len(config.failure_threshold.max(1) as usize)
            .half_open_len(config.success_threshold.max(1) as usize)
            .open_wait(config.recovery_timeout())
            .build();

        Self {
            name: name.into(),
            inner: recloser.into(),
            calls_total: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute an async operation through the circuit breaker.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> std::result::Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.calls_total.fetch_add(1, Ordering::Relaxed);

        match self.inner.call(f()).await {
            Ok(result) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_circuit_call(&self.name, "success");
                debug!(circuit = %self.name, "Circuit call succeeded");
                Ok(result)
            }
            Err(RecloserError::Rejected) => {
                self.rejections.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_circuit_rejection(&self.name);
                warn!(circuit = %self.name, "Circuit breaker rejected call (open)");
                Err(CircuitError::Rejected)
            }
            Err(RecloserError::Inner(e)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_circuit_call(&self.name, "failure");
                debug!(circuit = %self.name, "Circuit call failed");
                Err(CircuitError::Inner(e))
            }
        }
    }

    #[must_use]
    pub fn calls_total(&self) -> u64 {
        self.calls_total.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }
}

/// Remote fetch, optionally guarded by a circuit breaker.
pub struct FetchCircuit {
    breaker: Option<CircuitBreaker>,
}

impl FetchCircuit {
    pub fn new(config: &CircuitConfig) -> Self {
        Self {
            breaker: config
                .enabled
                .then(|| CircuitBreaker::new("remote_fetch", config)),
        }
    }

    /// Pass-through, no breaker.
    pub fn disabled() -> Self {
        Self { breaker: None }
    }

    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }

    /// Fetch one batch from `remote`.
    ///
    /// Both a remote failure and a rejection by an open circuit surface as
    /// [`QuoteSyncError::Fetch`].
    pub async fn fetch<R: RemoteSource + ?Sized>(&self, remote: &R) -> Result<Vec<RemoteRecord>> {
        let Some(ref breaker) = self.breaker else {
            return remote.fetch_batch().await.map_err(QuoteSyncError::from);
        };
        match breaker.call(|| remote.fetch_batch()).await {
            Ok(batch) => Ok(batch),
            Err(CircuitError::Rejected) => Err(QuoteSyncError::Fetch(
                "circuit breaker open, remote fetch skipped".into(),
            )),
            Err(CircuitError::Inner(e)) => Err(e.into()),
        }
    }
}
