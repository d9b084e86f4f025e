//! Scripted `RemoteSource` for testing.
//!
//! Replays queued batches and failures in order, then falls back to a
//! default batch. A gated remote parks every fetch until `release()` so
//! tests can hold a session open in `Fetching`.

use quote_sync::remote::{FetchError, FetchFuture, FetchResult, RemoteRecord, RemoteSource};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Mock remote that records calls and replays scripted responses.
///
/// # Example
/// ```rust,ignore
/// let remote = MockRemote::new();
/// remote.push_batch(vec![RemoteRecord::from_post(1, "hello")]);
/// remote.push_failure("HTTP 503");
///
/// // first fetch returns the batch, second fails, later ones are empty
/// ```
pub struct MockRemote {
    responses: Mutex<VecDeque<FetchResult<Vec<RemoteRecord>>>>,
    default_batch: Mutex<Vec<RemoteRecord>>,
    calls: AtomicUsize,
    gate: Option<Notify>,
    entered: Notify,
}

#[allow(dead_code)]
impl MockRemote {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_batch: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            gate: None,
            entered: Notify::new(),
        }
    }

    /// Every fetch waits for a `release()`.
    pub fn gated() -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::new()
        }
    }

    /// Remote whose every fetch returns `batch`.
    pub fn serving(batch: Vec<RemoteRecord>) -> Self {
        let remote = Self::new();
        remote.set_default(batch);
        remote
    }

    pub fn push_batch(&self, batch: Vec<RemoteRecord>) {
        self.responses.lock().unwrap().push_back(Ok(batch));
    }

    pub fn push_failure(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(FetchError(message.to_string())));
    }

    pub fn set_default(&self, batch: Vec<RemoteRecord>) {
        *self.default_batch.lock().unwrap() = batch;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Let one parked (or the next) fetch proceed.
    pub fn release(&self) {
        if let Some(ref gate) = self.gate {
            gate.notify_one();
        }
    }

    /// Wait until a fetch has started.
    pub async fn wait_until_fetching(&self) {
        self.entered.notified().await;
    }

    fn next_response(&self) -> FetchResult<Vec<RemoteRecord>> {
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(self.default_batch.lock().unwrap().clone()),
        }
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteSource for MockRemote {
    fn fetch_batch(&self) -> FetchFuture<'_, Vec<RemoteRecord>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            if let Some(ref gate) = self.gate {
                gate.notified().await;
            }
            self.next_response()
        })
    }
}
