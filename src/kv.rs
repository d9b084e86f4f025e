// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable key-value capability.
//!
//! The store and scheduler persist through [`KvStore`] and never touch a
//! storage medium directly. Two adapters ship with the crate:
//!
//! - [`MemoryKv`]: process-local map, with save-failure injection for tests
//! - [`SqliteKv`](crate::sqlite_kv::SqliteKv): SQLite-backed, survives restarts
//!
//! # Example
//!
//! ```rust,no_run
//! use quote_sync::kv::{KvStore, KvResult, BoxFuture};
//! use std::collections::HashMap;
//! use std::sync::Mutex;
//!
//! struct MyKv { inner: Mutex<HashMap<String, Vec<u8>>> }
//!
//! impl KvStore for MyKv {
//!     fn load(&self, key: &str) -> BoxFuture<'_, Option<Vec<u8>>> {
//!         let value = self.inner.lock().unwrap().get(key).cloned();
//!         Box::pin(async move { Ok(value) })
//!     }
//!
//!     fn save(&self, key: &str, value: Vec<u8>) -> BoxFuture<'_, ()> {
//!         self.inner.lock().unwrap().insert(key.to_string(), value);
//!         Box::pin(async move { Ok(()) })
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Result type for KV operations.
pub type KvResult<T> = std::result::Result<T, KvError>;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = KvResult<T>> + Send + 'a>>;

/// Simplified error for KV operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvError(pub String);

impl std::fmt::Display for KvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for KvError {}

/// What the engine needs from durable storage.
pub trait KvStore: Send + Sync + 'static {
    /// Read the bytes stored under `key`, `None` if never written.
    fn load(&self, key: &str) -> BoxFuture<'_, Option<Vec<u8>>>;

    /// Write `value` under `key`, replacing any previous value.
    fn save(&self, key: &str, value: Vec<u8>) -> BoxFuture<'_, ()>;
}

/// In-memory KV store.
///
/// Saves can be made to fail on demand with [`set_fail_saves`](Self::set_fail_saves),
/// which is how storage outages are simulated in tests.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    fail_saves: AtomicBool,
    saves: AtomicU64,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a key (bypasses failure injection).
    pub async fn seed(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.entries.write().await.insert(key.to_string(), value.into());
    }

    /// Make every subsequent `save` fail until reset.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Direct read for assertions.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.read().await.get(key).cloned()
    }
}

impl KvStore for MemoryKv {
    fn load(&self, key: &str) -> BoxFuture<'_, Option<Vec<u8>>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.entries.read().await.get(&key).cloned()) })
    }

    fn save(&self, key: &str, value: Vec<u8>) -> BoxFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(KvError(format!("injected save failure for {}", key)));
            }
            self.entries.write().await.insert(key, value);
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}
