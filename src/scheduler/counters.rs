// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Load and save of the scalar sync counters.
//!
//! Each counter lives under its own key as UTF-8 text: decimal integers for
//! the counts, RFC 3339 for the last-sync time. Unreadable values log a
//! warning and start from zero.

use super::types::SyncCounters;
use crate::config::StoreConfig;
use crate::error::{QuoteSyncError, Result};
use crate::kv::KvStore;
use chrono::{DateTime, Utc};
use tracing::warn;

pub(crate) async fn load<K: KvStore>(kv: &K, keys: &StoreConfig) -> Result<SyncCounters> {
    let sync_count = load_text(kv, &keys.sync_count_key)
        .await?
        .map(|s| parse_count(&keys.sync_count_key, &s))
        .unwrap_or_default();
    let conflicts_resolved = load_text(kv, &keys.conflicts_resolved_key)
        .await?
        .map(|s| parse_count(&keys.conflicts_resolved_key, &s))
        .unwrap_or_default();
    let last_sync = load_text(kv, &keys.last_sync_key)
        .await?
        .and_then(|s| match DateTime::parse_from_rfc3339(s.trim()) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(e) => {
                warn!(key = %keys.last_sync_key, error = %e, "Unreadable last sync time, ignoring");
                None
            }
        });

    Ok(SyncCounters {
        sync_count,
        conflicts_resolved,
        last_sync,
    })
}

pub(crate) async fn save<K: KvStore>(kv: &K, keys: &StoreConfig, counters: &SyncCounters) -> Result<()> {
    save_text(kv, &keys.sync_count_key, counters.sync_count.to_string()).await?;
    save_text(kv, &keys.conflicts_resolved_key, counters.conflicts_resolved.to_string()).await?;
    if let Some(last) = counters.last_sync {
        save_text(kv, &keys.last_sync_key, last.to_rfc3339()).await?;
    }
    Ok(())
}

async fn load_text<K: KvStore>(kv: &K, key: &str) -> Result<Option<String>> {
    let bytes = kv
        .load(key)
        .await
        .map_err(|e| QuoteSyncError::persistence(key, e.0))?;
    Ok(bytes.map(|b| String::from_utf8_lossy(&b).into_owned()))
}

async fn save_text<K: KvStore>(kv: &K, key: &str, value: String) -> Result<()> {
    kv.save(key, value.into_bytes())
        .await
        .map_err(|e| QuoteSyncError::persistence(key, e.0))
}

fn parse_count(key: &str, raw: &str) -> u64 {
    raw.trim().parse().unwrap_or_else(|_| {
        warn!(key, value = raw, "Unreadable counter, starting from zero");
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_missing_counters_default_to_zero() {
        let kv = MemoryKv::new();
        let counters = load(&kv, &StoreConfig::default()).await.unwrap();
        assert_eq!(counters, SyncCounters::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let kv = MemoryKv::new();
        let keys = StoreConfig::default();
        let counters = SyncCounters {
            sync_count: 7,
            conflicts_resolved: 3,
            last_sync: Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()),
        };

        save(&kv, &keys, &counters).await.unwrap();

        assert_eq!(kv.get("sync_count").await.unwrap(), b"7".to_vec());
        assert_eq!(load(&kv, &keys).await.unwrap(), counters);
    }

    #[tokio::test]
    async fn test_garbage_counters_are_ignored() {
        let kv = MemoryKv::new();
        kv.seed("sync_count", "seven").await;
        kv.seed("conflicts_resolved", "2").await;
        kv.seed("last_sync_time", "yesterday").await;

        let counters = load(&kv, &StoreConfig::default()).await.unwrap();
        assert_eq!(counters.sync_count, 0);
        assert_eq!(counters.conflicts_resolved, 2);
        assert!(counters.last_sync.is_none());
    }

    #[tokio::test]
    async fn test_save_failure_is_persistence_error() {
        let kv = MemoryKv::new();
        kv.set_fail_saves(true);
        let err = save(&kv, &StoreConfig::default(), &SyncCounters::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Persistence);
    }
}
