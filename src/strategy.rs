// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resolution strategies.
//!
//! Each strategy is a pure transform from the current record set (plus a
//! conflict or a batch) to a [`Resolution`]. The store commits the result
//! atomically via [`RecordStore::apply`](crate::store::RecordStore::apply).
//!
//! | Strategy | Conflicting record | Additions |
//! |----------|--------------------|-----------|
//! | server-wins | takes remote content, revision + 1 | untouched |
//! | local-wins | untouched | untouched |
//! | merge | untouched | appended |
//! | replace-with-batch | whole set replaced | whole set replaced |

use crate::detector::Conflict;
use crate::error::QuoteSyncError;
use crate::record::{Record, RecordId, RecordSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Caller-selectable resolution for a single conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ServerWins,
    LocalWins,
    Merge,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServerWins => "server",
            Self::LocalWins => "local",
            Self::Merge => "merge",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = QuoteSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" | "server_wins" | "server-wins" => Ok(Self::ServerWins),
            "local" | "local_wins" | "local-wins" => Ok(Self::LocalWins),
            "merge" => Ok(Self::Merge),
            other => Err(QuoteSyncError::Validation(format!(
                "unknown resolution strategy {:?}",
                other
            ))),
        }
    }
}

/// Result of a resolution transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The full record set after resolution.
    pub records: Vec<Record>,
    /// Human-readable summary for the notification sink.
    pub outcome: String,
    /// Existing records whose content changed.
    pub changed: usize,
    /// Records that were not present before.
    pub added: usize,
    /// Records that are no longer present.
    pub removed: usize,
}

impl Resolution {
    /// True when the record set is unchanged.
    pub fn is_noop(&self) -> bool {
        self.changed == 0 && self.added == 0 && self.removed == 0
    }
}

/// Apply the remote side of `conflict` to the matching local record.
///
/// If the local record has been removed since detection, nothing changes.
pub fn server_wins(current: &[Record], conflict: &Conflict, now: DateTime<Utc>) -> Resolution {
    let mut records = current.to_vec();
    let Some(local) = records.iter_mut().find(|r| r.id == conflict.id) else {
        return Resolution {
            records,
            outcome: format!("Quote {} no longer exists locally, nothing to resolve", conflict.id),
            changed: 0,
            added: 0,
            removed: 0,
        };
    };

    let remote = &conflict.remote;
    local.text = remote.text.trim().to_string();
    local.category = remote.category.trim().to_string();
    if remote.external_id.is_some() {
        local.external_id = remote.external_id.clone();
    }
    if remote.author.is_some() {
        local.author = remote.author.clone();
    }
    local.source = RecordSource::Remote;
    local.revision += 1;
    local.updated_at = now;

    Resolution {
        records,
        outcome: format!("Server version applied to quote {}", conflict.id),
        changed: 1,
        added: 0,
        removed: 0,
    }
}

/// Keep the local record as is.
pub fn local_wins(current: &[Record], conflict: &Conflict) -> Resolution {
    Resolution {
        records: current.to_vec(),
        outcome: format!("Local version kept for quote {}", conflict.id),
        changed: 0,
        added: 0,
        removed: 0,
    }
}

/// Append each addition whose id is not present yet.
///
/// Never overwrites. Applying the same additions twice is a no-op.
pub fn merge(current: &[Record], additions: &[Record]) -> Resolution {
    let mut records = current.to_vec();
    let mut seen: HashSet<RecordId> = records.iter().map(|r| r.id.clone()).collect();
    let mut added = 0;
    for addition in additions {
        if seen.insert(addition.id.clone()) {
            records.push(addition.clone());
            added += 1;
        }
    }
    Resolution {
        records,
        outcome: format!("Merged {} new quote(s) from server", added),
        changed: 0,
        added,
        removed: 0,
    }
}

/// Resolve one conflict with a caller-selected strategy.
///
/// `additions` are the session's unmatched remote records, used by
/// [`Strategy::Merge`].
pub fn resolve(
    strategy: Strategy,
    current: &[Record],
    conflict: &Conflict,
    additions: &[Record],
    now: DateTime<Utc>,
) -> Resolution {
    match strategy {
        Strategy::ServerWins => server_wins(current, conflict, now),
        Strategy::LocalWins => local_wins(current, conflict),
        Strategy::Merge => {
            let mut resolution = merge(current, additions);
            resolution.outcome = format!(
                "Local version kept for quote {}, merged {} new quote(s)",
                conflict.id, resolution.added
            );
            resolution
        }
    }
}

/// Replace the entire local set with `batch`.
///
/// Duplicate ids in `batch` keep their first occurrence. Ids that existed
/// before get `revision = max(old + 1, incoming)` so revisions never move
/// backwards.
pub fn replace_with_batch(current: &[Record], batch: &[Record]) -> Resolution {
    let previous: HashMap<&RecordId, u64> = current.iter().map(|r| (&r.id, r.revision)).collect();
    let mut seen: HashSet<&RecordId> = HashSet::with_capacity(batch.len());
    let mut records = Vec::with_capacity(batch.len());
    let mut changed = 0;
    let mut added = 0;

    for incoming in batch {
        if !seen.insert(&incoming.id) {
            continue;
        }
        let mut next = incoming.clone();
        match previous.get(&incoming.id) {
            Some(&old) => {
                next.revision = next.revision.max(old + 1);
                changed += 1;
            }
            None => added += 1,
        }
        records.push(next);
    }

    let removed = current.iter().filter(|r| !seen.contains(&r.id)).count();
    Resolution {
        outcome: format!(
            "Replaced local quotes with server batch ({} kept, {} new, {} removed)",
            changed, added, removed
        ),
        records,
        changed,
        added,
        removed,
    }
}
