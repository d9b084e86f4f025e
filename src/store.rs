// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The local, authoritative record store.
//!
//! An insertion-ordered collection of [`Record`]s behind an async mutex,
//! persisted as one JSON array under the configured records key.
//!
//! # Persistence Contract
//!
//! Every mutating operation persists before returning. When the write fails:
//!
//! - the in-memory mutation is kept (no rollback)
//! - the store is marked dirty
//! - the operation returns [`QuoteSyncError::Persistence`]
//!
//! A later successful write, or [`flush()`](RecordStore::flush), clears the
//! dirty flag. The scheduler flushes at the end of every session and on stop.
//!
//! # Readers
//!
//! Readers get clones. Nothing outside the store holds a reference into the
//! collection, so all changes go through the operations below.

use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::error::{QuoteSyncError, Result};
use crate::identity::normalize_category;
use crate::kv::KvStore;
use crate::record::{default_records, validate_content, Record, RecordId, RecordPatch, RecordSource};
use crate::strategy::{self, Resolution};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Summary counts over the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub categories: usize,
    pub local: usize,
    pub remote: usize,
    pub merged: usize,
    pub imported: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// Document produced by [`RecordStore::export_json`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub quotes: Vec<Record>,
    pub export_date: DateTime<Utc>,
    pub total_quotes: usize,
    pub categories: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportPayload {
    Document { quotes: Vec<serde_json::Value> },
    Bare(Vec<serde_json::Value>),
}

/// Loosely typed import item. Validated one by one.
#[derive(Deserialize)]
struct ImportItem {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    revision: Option<u64>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    external_id: Option<String>,
    #[serde(default)]
    author: Option<String>,
}

impl ImportItem {
    fn id(&self) -> Option<RecordId> {
        match self.id {
            Some(serde_json::Value::String(ref s)) if !s.trim().is_empty() => Some(RecordId::new(s.trim())),
            Some(serde_json::Value::Number(ref n)) => Some(RecordId::new(n.to_string())),
            _ => None,
        }
    }

    fn source(&self) -> RecordSource {
        match self.source.as_deref().map(str::trim) {
            Some("local") => RecordSource::Local,
            Some("remote") | Some("server") => RecordSource::Remote,
            Some("merged") => RecordSource::Merged,
            _ => RecordSource::Imported,
        }
    }
}

/// Insertion-ordered record collection with a durable KV backing.
pub struct RecordStore<K: KvStore> {
    kv: Arc<K>,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    records: Mutex<Vec<Record>>,
    dirty: AtomicBool,
}

impl<K: KvStore> RecordStore<K> {
    /// Load the record set from `kv`.
    ///
    /// - absent key: seed defaults (if enabled) and persist them
    /// - unreadable payload: warn and fall back to defaults in memory, leaving
    ///   the stored bytes untouched
    /// - KV read failure: error
    pub async fn open(kv: Arc<K>, config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let loaded = kv
            .load(&config.records_key)
            .await
            .map_err(|e| QuoteSyncError::persistence(&config.records_key, e.0))?;

        let now = clock.now();
        let seed = |enabled: bool| if enabled { default_records(now) } else { Vec::new() };

        let (records, needs_save) = match loaded {
            None => {
                info!(key = %config.records_key, "No stored quotes, starting from defaults");
                (seed(config.seed_defaults), config.seed_defaults)
            }
            Some(bytes) => match serde_json::from_slice::<Vec<Record>>(&bytes) {
                Ok(stored) => (sanitize_loaded(stored), false),
                Err(e) => {
                    warn!(
                        key = %config.records_key,
                        error = %e,
                        "Stored quotes unreadable, using defaults in memory"
                    );
                    (seed(config.seed_defaults), false)
                }
            },
        };

        info!(count = records.len(), "Record store opened");
        crate::metrics::set_record_count(records.len());

        let store = Self {
            kv,
            config,
            clock,
            records: Mutex::new(records),
            dirty: AtomicBool::new(false),
        };

        if needs_save {
            let guard = store.records.lock().await;
            if let Err(e) = store.persist(&guard).await {
                warn!(error = %e, "Could not persist default quotes, will retry on flush");
            }
        }
        Ok(store)
    }

    pub fn kv(&self) -> &Arc<K> {
        &self.kv
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    async fn persist(&self, records: &[Record]) -> Result<()> {
        let bytes = serde_json::to_vec(records)?;
        match self.kv.save(&self.config.records_key, bytes).await {
            Ok(()) => {
                self.dirty.store(false, Ordering::SeqCst);
                crate::metrics::record_persist(true);
                debug!(count = records.len(), "Quotes persisted");
                Ok(())
            }
            Err(e) => {
                self.dirty.store(true, Ordering::SeqCst);
                crate::metrics::record_persist(false);
                warn!(key = %self.config.records_key, error = %e, "Failed to persist quotes");
                Err(QuoteSyncError::persistence(&self.config.records_key, e.0))
            }
        }
    }

    fn mutated(&self, operation: &str, records: &[Record]) {
        crate::metrics::record_store_mutation(operation);
        crate::metrics::set_record_count(records.len());
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Mutations
    // ═══════════════════════════════════════════════════════════════════════

    /// Add a new local quote.
    pub async fn add(&self, text: &str, category: &str) -> Result<Record> {
        let (text, category) = validate_content(text, category)?;
        let mut records = self.records.lock().await;

        let mut id = RecordId::generate();
        while records.iter().any(|r| r.id == id) {
            id = RecordId::generate();
        }
        let record = Record::new(id, &text, &category, RecordSource::Local, self.clock.now())?;
        records.push(record.clone());
        debug!(id = %record.id, category = %record.category, "Quote added");
        self.mutated("add", &records);

        self.persist(&records).await?;
        Ok(record)
    }

    /// Delete by id. `false` (and no write) if absent.
    pub async fn remove(&self, id: &RecordId) -> Result<bool> {
        let mut records = self.records.lock().await;
        let Some(pos) = records.iter().position(|r| &r.id == id) else {
            return Ok(false);
        };
        records.remove(pos);
        debug!(id = %id, "Quote removed");
        self.mutated("remove", &records);

        self.persist(&records).await?;
        Ok(true)
    }

    /// Apply a partial update. `false` (and no write) if absent.
    pub async fn update(&self, id: &RecordId, patch: RecordPatch) -> Result<bool> {
        let mut records = self.records.lock().await;
        let Some(pos) = records.iter().position(|r| &r.id == id) else {
            return Ok(false);
        };
        let next = patch.apply(&records[pos], self.clock.now())?;
        debug!(id = %id, revision = next.revision, "Quote updated");
        records[pos] = next;
        self.mutated("update", &records);

        self.persist(&records).await?;
        Ok(true)
    }

    /// Substitute the entire record set in one write.
    ///
    /// Duplicate ids keep the first occurrence. Ids that existed before get
    /// `revision = max(old + 1, incoming)`.
    #[instrument(skip_all, fields(incoming = incoming.len()))]
    pub async fn replace_all(&self, incoming: Vec<Record>) -> Result<()> {
        for record in &incoming {
            record.validate()?;
        }
        let mut records = self.records.lock().await;
        let resolution = strategy::replace_with_batch(&records, &incoming);
        info!(outcome = %resolution.outcome, "Record set replaced");
        *records = resolution.records;
        self.mutated("replace_all", &records);

        self.persist(&records).await
    }

    /// Insert records whose id is not present yet. Never overwrites.
    ///
    /// Returns the number inserted. Writes only if something was inserted.
    pub async fn merge_in(&self, incoming: &[Record]) -> Result<usize> {
        for record in incoming {
            record.validate()?;
        }
        let mut records = self.records.lock().await;
        let resolution = strategy::merge(&records, incoming);
        if resolution.added == 0 {
            return Ok(0);
        }
        *records = resolution.records;
        debug!(added = resolution.added, "Records merged");
        self.mutated("merge_in", &records);

        self.persist(&records).await?;
        Ok(resolution.added)
    }

    /// Run a pure resolution transform under the store lock and commit it in
    /// one write. A no-op resolution writes nothing.
    pub async fn apply<F>(&self, transform: F) -> Result<Resolution>
    where
        F: FnOnce(&[Record]) -> Resolution,
    {
        let mut records = self.records.lock().await;
        let resolution = transform(&records);
        if resolution.is_noop() {
            return Ok(resolution);
        }
        *records = resolution.records.clone();
        self.mutated("apply", &records);

        self.persist(&records).await?;
        Ok(resolution)
    }

    /// Like [`apply`](Self::apply) but only marks the store dirty.
    ///
    /// Sessions stage their changes and write once in the Persisting step.
    pub(crate) async fn stage<F>(&self, transform: F) -> Resolution
    where
        F: FnOnce(&[Record]) -> Resolution,
    {
        let mut records = self.records.lock().await;
        let resolution = transform(&records);
        if !resolution.is_noop() {
            *records = resolution.records.clone();
            self.dirty.store(true, Ordering::SeqCst);
            self.mutated("stage", &records);
        }
        resolution
    }

    /// Write the current set if an earlier write failed or a change is staged.
    ///
    /// Returns `true` if a write happened.
    pub async fn flush(&self) -> Result<bool> {
        if !self.is_dirty() {
            return Ok(false);
        }
        let records = self.records.lock().await;
        self.persist(&records).await?;
        info!(count = records.len(), "Dirty quotes flushed");
        Ok(true)
    }

    pub async fn clear_all(&self) -> Result<()> {
        let mut records = self.records.lock().await;
        records.clear();
        info!("All quotes cleared");
        self.mutated("clear_all", &records);
        self.persist(&records).await
    }

    /// Replace everything with the built-in default quotes.
    pub async fn reset_to_defaults(&self) -> Result<()> {
        let defaults = default_records(self.clock.now());
        let mut records = self.records.lock().await;
        *records = strategy::replace_with_batch(&records, &defaults).records;
        info!(count = records.len(), "Quotes reset to defaults");
        self.mutated("reset_to_defaults", &records);
        self.persist(&records).await
    }

    /// Import from a JSON export document or a bare JSON array.
    ///
    /// Invalid items and items whose id already exists are skipped. Items
    /// without an id get a fresh one. Returns the number imported.
    #[instrument(skip_all, fields(bytes = payload.len()))]
    pub async fn import_json(&self, payload: &str) -> Result<usize> {
        let items = match serde_json::from_str::<ImportPayload>(payload) {
            Ok(ImportPayload::Document { quotes }) => quotes,
            Ok(ImportPayload::Bare(items)) => items,
            Err(e) => {
                return Err(QuoteSyncError::Validation(format!(
                    "import payload must be an export document or an array of quotes: {}",
                    e
                )))
            }
        };

        let now = self.clock.now();
        let mut records = self.records.lock().await;
        let mut seen: HashSet<RecordId> = records.iter().map(|r| r.id.clone()).collect();
        let mut imported = 0;
        let mut skipped = 0;

        for (index, value) in items.into_iter().enumerate() {
            let item = match serde_json::from_value::<ImportItem>(value) {
                Ok(item) => item,
                Err(e) => {
                    debug!(index, error = %e, "Skipping malformed import item");
                    skipped += 1;
                    continue;
                }
            };
            let text = item.text.as_deref().unwrap_or_default();
            let category = item.category.as_deref().unwrap_or_default();
            if validate_content(text, category).is_err() {
                debug!(index, "Skipping invalid import item");
                skipped += 1;
                continue;
            }

            let id = match item.id() {
                Some(id) if seen.contains(&id) => {
                    skipped += 1;
                    continue;
                }
                Some(id) => id,
                None => {
                    let mut id = RecordId::generate();
                    while seen.contains(&id) {
                        id = RecordId::generate();
                    }
                    id
                }
            };

            let mut record = Record::new(id, text, category, item.source(), item.updated_at.unwrap_or(now))?;
            record.revision = item.revision.unwrap_or(1).max(1);
            record.external_id = item.external_id.clone().filter(|e| !e.trim().is_empty());
            record.author = item.author.clone().filter(|a| !a.trim().is_empty());

            seen.insert(record.id.clone());
            records.push(record);
            imported += 1;
        }

        info!(imported, skipped, "Quotes imported");
        if imported == 0 {
            return Ok(0);
        }
        self.mutated("import", &records);
        self.persist(&records).await?;
        Ok(imported)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn get_all(&self) -> Vec<Record> {
        self.records.lock().await.clone()
    }

    pub async fn find_by_id(&self, id: &RecordId) -> Option<Record> {
        self.records.lock().await.iter().find(|r| &r.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Exact bytes a write would store right now.
    pub async fn serialized(&self) -> Result<Vec<u8>> {
        let records = self.records.lock().await;
        Ok(serde_json::to_vec(&*records)?)
    }

    /// Sorted, de-duplicated, case-folded categories.
    pub async fn categories(&self) -> Vec<String> {
        let records = self.records.lock().await;
        collect_categories(&records)
    }

    /// Case-insensitive substring search over text and category.
    pub async fn search(&self, term: &str) -> Vec<Record> {
        let needle = term.trim().to_lowercase();
        let records = self.records.lock().await;
        if needle.is_empty() {
            return records.clone();
        }
        records
            .iter()
            .filter(|r| r.text.to_lowercase().contains(&needle) || r.category.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    pub async fn by_source(&self, source: RecordSource) -> Vec<Record> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.source == source)
            .cloned()
            .collect()
    }

    pub async fn stats(&self) -> StoreStats {
        let records = self.records.lock().await;
        let mut stats = StoreStats {
            total: records.len(),
            categories: collect_categories(&records).len(),
            ..Default::default()
        };
        for r in records.iter() {
            match r.source {
                RecordSource::Local => stats.local += 1,
                RecordSource::Remote => stats.remote += 1,
                RecordSource::Merged => stats.merged += 1,
                RecordSource::Imported => stats.imported += 1,
            }
            stats.oldest = Some(stats.oldest.map_or(r.updated_at, |t| t.min(r.updated_at)));
            stats.newest = Some(stats.newest.map_or(r.updated_at, |t| t.max(r.updated_at)));
        }
        stats
    }

    /// Pretty-printed export document.
    pub async fn export_json(&self) -> Result<String> {
        let records = self.records.lock().await;
        let doc = ExportDocument {
            categories: collect_categories(&records),
            total_quotes: records.len(),
            export_date: self.clock.now(),
            quotes: records.clone(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }
}

fn collect_categories(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| normalize_category(&r.category))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Drop invalid and duplicate records from a loaded set.
fn sanitize_loaded(stored: Vec<Record>) -> Vec<Record> {
    let total = stored.len();
    let mut seen = HashSet::with_capacity(total);
    let records: Vec<Record> = stored
        .into_iter()
        .filter(|r| r.validate().is_ok() && seen.insert(r.id.clone()))
        .collect();
    if records.len() != total {
        warn!(dropped = total - records.len(), "Dropped invalid or duplicate stored quotes");
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::kv::MemoryKv;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    async fn empty_store() -> (RecordStore<MemoryKv>, Arc<MemoryKv>, Arc<ManualClock>) {
        let kv = Arc::new(MemoryKv::new());
        let clock = Arc::new(ManualClock::new(start()));
        let config = StoreConfig {
            seed_defaults: false,
            ..Default::default()
        };
        let store = RecordStore::open(kv.clone(), config, clock.clone()).await.unwrap();
        (store, kv, clock)
    }

    fn rec(id: &str, text: &str, category: &str) -> Record {
        Record::new(RecordId::new(id), text, category, RecordSource::Remote, start()).unwrap()
    }

    #[tokio::test]
    async fn test_open_seeds_defaults_and_persists() {
        let kv = Arc::new(MemoryKv::new());
        let store = RecordStore::open(kv.clone(), StoreConfig::default(), Arc::new(ManualClock::new(start())))
            .await
            .unwrap();
        assert_eq!(store.len().await, 5);
        assert!(kv.get("quotes").await.is_some());
        assert!(!store.is_dirty());
    }

    #[tokio::test]
    async fn test_open_corrupt_payload_keeps_bytes() {
        let kv = Arc::new(MemoryKv::new());
        kv.seed("quotes", "{not json").await;
        let store = RecordStore::open(kv.clone(), StoreConfig::default(), Arc::new(ManualClock::new(start())))
            .await
            .unwrap();
        assert_eq!(store.len().await, 5);
        assert_eq!(kv.get("quotes").await, Some(b"{not json".to_vec()));
    }

    #[tokio::test]
    async fn test_open_restores_stored_records() {
        let kv = Arc::new(MemoryKv::new());
        let stored = vec![rec("a", "one", "x"), rec("b", "two", "y")];
        kv.seed("quotes", serde_json::to_vec(&stored).unwrap()).await;
        let store = RecordStore::open(kv, StoreConfig::default(), Arc::new(ManualClock::new(start())))
            .await
            .unwrap();
        assert_eq!(store.get_all().await, stored);
    }

    #[tokio::test]
    async fn test_add_then_find() {
        let (store, kv, _) = empty_store().await;
        let added = store.add("  Be kind.  ", " Life ").await.unwrap();
        let found = store.find_by_id(&added.id).await.unwrap();
        assert_eq!(found.text, "Be kind.");
        assert_eq!(found.category, "Life");
        assert_eq!(found.revision, 1);
        assert_eq!(found.source, RecordSource::Local);
        assert_eq!(kv.save_count(), 1);

        let other = store.add("Another", "life").await.unwrap();
        assert_ne!(added.id, other.id);
    }

    #[tokio::test]
    async fn test_add_validation_changes_nothing() {
        let (store, kv, _) = empty_store().await;
        assert!(matches!(store.add("  ", "x").await, Err(QuoteSyncError::Validation(_))));
        assert!(matches!(store.add("x", "").await, Err(QuoteSyncError::Validation(_))));
        assert!(store.is_empty().await);
        assert_eq!(kv.save_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_missing_is_noop() {
        let (store, kv, _) = empty_store().await;
        store.add("keep", "x").await.unwrap();
        let before = store.serialized().await.unwrap();
        let missing = RecordId::new("nope");
        assert!(!store.remove(&missing).await.unwrap());
        assert!(!store.remove(&missing).await.unwrap());
        assert_eq!(store.serialized().await.unwrap(), before);
        assert_eq!(kv.save_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_existing() {
        let (store, _, _) = empty_store().await;
        let r = store.add("gone soon", "x").await.unwrap();
        assert!(store.remove(&r.id).await.unwrap());
        assert!(store.find_by_id(&r.id).await.is_none());
    }

    #[tokio::test]
    async fn test_update_bumps_revision_and_timestamp() {
        let (store, _, clock) = empty_store().await;
        let r = store.add("old", "x").await.unwrap();
        clock.advance(chrono::Duration::seconds(5));

        assert!(store.update(&r.id, RecordPatch::default().text("new")).await.unwrap());
        let updated = store.find_by_id(&r.id).await.unwrap();
        assert_eq!(updated.text, "new");
        assert_eq!(updated.revision, 2);
        assert!(updated.updated_at > r.updated_at);
    }

    #[tokio::test]
    async fn test_update_invalid_changes_nothing() {
        let (store, _, _) = empty_store().await;
        let r = store.add("old", "x").await.unwrap();
        let err = store.update(&r.id, RecordPatch::default().text("   ")).await.unwrap_err();
        assert!(matches!(err, QuoteSyncError::Validation(_)));
        assert_eq!(store.find_by_id(&r.id).await.unwrap(), r);
    }

    #[tokio::test]
    async fn test_update_missing_returns_false() {
        let (store, _, _) = empty_store().await;
        assert!(!store.update(&RecordId::new("x"), RecordPatch::default().text("t")).await.unwrap());
    }

    #[tokio::test]
    async fn test_merge_in_idempotent() {
        let (store, kv, _) = empty_store().await;
        let batch = vec![rec("1", "a", "x"), rec("2", "b", "y"), rec("1", "dup", "x")];
        assert_eq!(store.merge_in(&batch).await.unwrap(), 2);
        let after_once = store.serialized().await.unwrap();
        let saves = kv.save_count();

        assert_eq!(store.merge_in(&batch).await.unwrap(), 0);
        assert_eq!(store.serialized().await.unwrap(), after_once);
        assert_eq!(kv.save_count(), saves);
    }

    #[tokio::test]
    async fn test_merge_in_never_overwrites() {
        let (store, _, _) = empty_store().await;
        store.merge_in(&[rec("1", "original", "x")]).await.unwrap();
        store.merge_in(&[rec("1", "changed", "x")]).await.unwrap();
        assert_eq!(store.find_by_id(&RecordId::new("1")).await.unwrap().text, "original");
    }

    #[tokio::test]
    async fn test_replace_all_revision_rule() {
        let (store, _, _) = empty_store().await;
        store.merge_in(&[rec("1", "a", "x").with_revision(3)]).await.unwrap();
        store
            .replace_all(vec![rec("1", "b", "x").with_revision(1), rec("1", "c", "x"), rec("2", "d", "y")])
            .await
            .unwrap();
        let all = store.get_all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].text, "b");
        assert_eq!(all[0].revision, 4);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_mutation_and_flush_recovers() {
        let (store, kv, _) = empty_store().await;
        kv.set_fail_saves(true);

        let err = store.add("survives", "x").await.unwrap_err();
        assert!(matches!(err, QuoteSyncError::Persistence { .. }));
        assert!(store.is_dirty());
        assert_eq!(store.len().await, 1);
        assert!(store.flush().await.is_err());

        kv.set_fail_saves(false);
        assert!(store.flush().await.unwrap());
        assert!(!store.is_dirty());
        assert!(!store.flush().await.unwrap());

        let stored: Vec<Record> = serde_json::from_slice(&kv.get("quotes").await.unwrap()).unwrap();
        assert_eq!(stored[0].text, "survives");
    }

    #[tokio::test]
    async fn test_apply_commits_once() {
        let (store, kv, _) = empty_store().await;
        let additions = vec![rec("1", "a", "x"), rec("2", "b", "x")];
        let res = store.apply(|current| strategy::merge(current, &additions)).await.unwrap();
        assert_eq!(res.added, 2);
        assert_eq!(kv.save_count(), 1);

        let res = store.apply(|current| strategy::merge(current, &additions)).await.unwrap();
        assert!(res.is_noop());
        assert_eq!(kv.save_count(), 1);
    }

    #[tokio::test]
    async fn test_apply_commits_removal_only_resolution() {
        let (store, kv, _) = empty_store().await;
        store.merge_in(&[rec("1", "a", "x")]).await.unwrap();
        let saves = kv.save_count();

        let res = store.apply(|current| strategy::replace_with_batch(current, &[])).await.unwrap();
        assert_eq!(res.removed, 1);
        assert!(!res.is_noop());
        assert!(store.is_empty().await);
        assert_eq!(kv.save_count(), saves + 1);

        let stored: Vec<Record> = serde_json::from_slice(&kv.get("quotes").await.unwrap()).unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_stage_commits_removal_only_resolution() {
        let (store, kv, _) = empty_store().await;
        store.merge_in(&[rec("1", "a", "x")]).await.unwrap();
        store.stage(|current| strategy::replace_with_batch(current, &[])).await;
        assert!(store.is_dirty());
        assert!(store.is_empty().await);
        assert!(store.flush().await.unwrap());
        assert_eq!(kv.get("quotes").await, Some(b"[]".to_vec()));
    }

    #[tokio::test]
    async fn test_stage_marks_dirty_without_writing() {
        let (store, kv, _) = empty_store().await;
        let additions = vec![rec("1", "a", "x")];
        store.stage(|current| strategy::merge(current, &additions)).await;
        assert!(store.is_dirty());
        assert_eq!(kv.save_count(), 0);
        assert!(store.flush().await.unwrap());
        assert_eq!(kv.save_count(), 1);
    }

    #[tokio::test]
    async fn test_categories_search_and_source() {
        let (store, _, _) = empty_store().await;
        store.add("Dream big", "Dreams").await.unwrap();
        store.add("Keep going", "motivation").await.unwrap();
        store.merge_in(&[rec("s1", "Stay curious", "dreams")]).await.unwrap();

        assert_eq!(store.categories().await, vec!["dreams".to_string(), "motivation".to_string()]);
        assert_eq!(store.search("DREAM").await.len(), 2);
        assert_eq!(store.search("curious").await.len(), 1);
        assert_eq!(store.search("  ").await.len(), 3);
        assert_eq!(store.by_source(RecordSource::Remote).await.len(), 1);
        assert_eq!(store.by_source(RecordSource::Local).await.len(), 2);
    }

    #[tokio::test]
    async fn test_stats() {
        let (store, _, clock) = empty_store().await;
        assert_eq!(store.stats().await, StoreStats::default());

        store.add("first", "a").await.unwrap();
        clock.advance(chrono::Duration::minutes(1));
        store.add("second", "b").await.unwrap();

        let stats = store.stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.categories, 2);
        assert_eq!(stats.local, 2);
        assert_eq!(stats.oldest, Some(start()));
        assert_eq!(stats.newest, Some(start() + chrono::Duration::minutes(1)));
    }

    #[tokio::test]
    async fn test_export_then_import_into_empty_store() {
        let (source, _, _) = empty_store().await;
        source.add("One", "x").await.unwrap();
        source.add("Two", "y").await.unwrap();
        let exported = source.export_json().await.unwrap();

        let doc: serde_json::Value = serde_json::from_str(&exported).unwrap();
        assert_eq!(doc["total_quotes"], 2);
        assert_eq!(doc["categories"], serde_json::json!(["x", "y"]));

        let (target, _, _) = empty_store().await;
        assert_eq!(target.import_json(&exported).await.unwrap(), 2);
        assert_eq!(target.get_all().await, source.get_all().await);
        // Same ids again are skipped
        assert_eq!(target.import_json(&exported).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_import_bare_array_skips_invalid() {
        let (store, _, _) = empty_store().await;
        let payload = r#"[
            {"text": "no id", "category": "misc"},
            {"id": 7, "text": "numeric id", "category": "misc", "source": "server"},
            {"id": "x", "text": "", "category": "misc"},
            {"id": "y", "text": "no category"},
            "not an object",
            {"id": "z", "text": "fine", "category": "misc", "revision": 4}
        ]"#;
        assert_eq!(store.import_json(payload).await.unwrap(), 3);

        let all = store.get_all().await;
        assert_eq!(all[0].source, RecordSource::Imported);
        assert!(all[0].id.as_str().starts_with("quote_"));
        assert_eq!(all[1].id.as_str(), "7");
        assert_eq!(all[1].source, RecordSource::Remote);
        assert_eq!(all[2].revision, 4);
    }

    #[tokio::test]
    async fn test_import_rejects_wrong_shape() {
        let (store, kv, _) = empty_store().await;
        for payload in [r#"{"items": []}"#, "42", "nonsense"] {
            let err = store.import_json(payload).await.unwrap_err();
            assert!(matches!(err, QuoteSyncError::Validation(_)), "payload {}", payload);
        }
        assert_eq!(kv.save_count(), 0);
    }

    #[tokio::test]
    async fn test_clear_and_reset() {
        let (store, _, _) = empty_store().await;
        store.add("temp", "x").await.unwrap();
        store.clear_all().await.unwrap();
        assert!(store.is_empty().await);

        store.reset_to_defaults().await.unwrap();
        assert_eq!(store.len().await, 5);
        assert_eq!(store.categories().await.len(), 5);
    }

    #[tokio::test]
    async fn test_reset_keeps_revisions_increasing() {
        let (store, _, _) = empty_store().await;
        store.reset_to_defaults().await.unwrap();
        let id = RecordId::new("1");
        store.update(&id, RecordPatch::default().text("edited")).await.unwrap();
        let before = store.find_by_id(&id).await.unwrap().revision;

        store.reset_to_defaults().await.unwrap();
        let after = store.find_by_id(&id).await.unwrap();
        assert!(after.revision > before);
        assert_ne!(after.text, "edited");
    }
}
