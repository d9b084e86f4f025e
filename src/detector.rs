// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Conflict detection between the local record set and a remote batch.
//!
//! Pure and deterministic: the same inputs always produce the same conflicts
//! in the same order (the order of the remote batch).
//!
//! # Matching
//!
//! ```text
//! remote record ──► local by id? ──yes──► content differs? ──yes──► Conflict
//!                        │                       │
//!                        no                      no ──► unchanged
//!                        ▼
//!              local by external_id? ──yes──► (same as above)
//!                        │
//!                        no ──► Addition
//! ```
//!
//! A local record is matched at most once. If a batch carries two remote
//! records for the same local record, only the first one is compared.

use crate::identity;
use crate::record::{Record, RecordId};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    ContentMismatch,
}

/// A local and a remote record for the same entity whose content differs.
///
/// Transient: produced per session, consumed by a resolution strategy,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Local id of the conflicting record.
    pub id: RecordId,
    pub local: Record,
    pub remote: Record,
    pub kind: ConflictKind,
}

/// Everything the detector learns from one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
    pub conflicts: Vec<Conflict>,
    /// Remote records with no local counterpart.
    pub additions: Vec<Record>,
    /// Matches whose content is identical.
    pub unchanged: usize,
}

struct LocalIndex<'a> {
    by_id: HashMap<&'a RecordId, &'a Record>,
    by_external: HashMap<&'a str, &'a Record>,
}

impl<'a> LocalIndex<'a> {
    fn build(local: &'a [Record]) -> Self {
        let mut by_id = HashMap::with_capacity(local.len());
        let mut by_external = HashMap::new();
        for record in local {
            by_id.entry(&record.id).or_insert(record);
            if let Some(ref ext) = record.external_id {
                by_external.entry(ext.as_str()).or_insert(record);
            }
        }
        Self { by_id, by_external }
    }

    fn lookup(&self, remote: &Record) -> Option<&'a Record> {
        if let Some(found) = self.by_id.get(&remote.id) {
            return Some(*found);
        }
        let ext = remote.external_id.as_deref()?;
        self.by_external
            .get(ext)
            .copied()
            .filter(|local| identity::same_entity(local, remote))
    }
}

/// Run conflict detection and addition discovery in one pass.
pub fn analyze(local: &[Record], remote: &[Record]) -> Analysis {
    let index = LocalIndex::build(local);
    let mut analysis = Analysis::default();
    let mut matched: HashSet<&RecordId> = HashSet::new();
    let mut added: HashSet<&RecordId> = HashSet::new();

    for incoming in remote {
        match index.lookup(incoming) {
            Some(existing) => {
                if !matched.insert(&existing.id) {
                    continue;
                }
                if identity::content_differs(existing, incoming) {
                    analysis.conflicts.push(Conflict {
                        id: existing.id.clone(),
                        local: existing.clone(),
                        remote: incoming.clone(),
                        kind: ConflictKind::ContentMismatch,
                    });
                } else {
                    analysis.unchanged += 1;
                }
            }
            None => {
                if added.insert(&incoming.id) {
                    analysis.additions.push(incoming.clone());
                }
            }
        }
    }

    tracing::debug!(
        local = local.len(),
        remote = remote.len(),
        conflicts = analysis.conflicts.len(),
        additions = analysis.additions.len(),
        unchanged = analysis.unchanged,
        "Batch analyzed"
    );
    analysis
}

/// Conflicts between `local` and `remote`, in remote order.
pub fn detect(local: &[Record], remote: &[Record]) -> Vec<Conflict> {
    analyze(local, remote).conflicts
}

/// Remote records with no local counterpart, in remote order.
pub fn additions(local: &[Record], remote: &[Record]) -> Vec<Record> {
    analyze(local, remote).additions
}
