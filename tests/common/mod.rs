//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - Scripted `RemoteSource` with a gate for overlap tests
//! - Recording and panicking status sinks
//! - Store and scheduler builders over `MemoryKv`

pub mod mock_remote;
pub mod sinks;

#[allow(unused_imports)]
pub use mock_remote::*;
#[allow(unused_imports)]
pub use sinks::*;

use chrono::{DateTime, TimeZone, Utc};
use quote_sync::{
    KvStore, ManualClock, MemoryKv, QuoteSyncConfig, RecordStore, RemoteSource, StatusSink, SyncScheduler,
};
use std::sync::Arc;

/// Fixed start time for the manual clock.
#[allow(dead_code)]
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

/// Open a store over `kv` with a manual clock at [`start_time`].
#[allow(dead_code)]
pub async fn open_store<K: KvStore>(kv: Arc<K>, config: &QuoteSyncConfig) -> Arc<RecordStore<K>> {
    let clock = Arc::new(ManualClock::new(start_time()));
    Arc::new(
        RecordStore::open(kv, config.store.clone(), clock)
            .await
            .expect("store should open"),
    )
}

/// Build a scheduler over a fresh `MemoryKv`.
#[allow(dead_code)]
pub async fn memory_scheduler<R: RemoteSource>(
    config: QuoteSyncConfig,
    remote: R,
    sink: Arc<dyn StatusSink>,
) -> (Arc<SyncScheduler<MemoryKv, R>>, Arc<MemoryKv>) {
    let kv = Arc::new(MemoryKv::new());
    let store = open_store(kv.clone(), &config).await;
    let scheduler = SyncScheduler::open(&config, store, Arc::new(remote), sink)
        .await
        .expect("scheduler should open");
    (Arc::new(scheduler), kv)
}
