// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote fetch capability.
//!
//! The engine depends on a single operation, [`RemoteSource::fetch_batch`],
//! not on a transport. Whatever the host uses (HTTP, a message bus, a file)
//! hands back loosely shaped [`RemoteRecord`]s which are validated and mapped
//! to [`Record`]s by [`ingest`]. Items that fail validation are skipped with a
//! warning and never reach the detector.

use crate::error::{QuoteSyncError, Result};
use crate::record::{Record, RecordId, RecordSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

/// Result type for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Type alias for boxed fetch futures.
pub type FetchFuture<'a, T> = Pin<Box<dyn Future<Output = FetchResult<T>> + Send + 'a>>;

/// Remote unreachable, bad response, or similar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError(pub String);

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for FetchError {}

impl From<FetchError> for QuoteSyncError {
    fn from(e: FetchError) -> Self {
        QuoteSyncError::Fetch(e.0)
    }
}

/// Source of truth the scheduler reconciles against.
pub trait RemoteSource: Send + Sync + 'static {
    /// Fetch the current remote batch.
    fn fetch_batch(&self) -> FetchFuture<'_, Vec<RemoteRecord>>;
}

/// Remote that always returns an empty batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRemote;

impl RemoteSource for NoOpRemote {
    fn fetch_batch(&self) -> FetchFuture<'_, Vec<RemoteRecord>> {
        Box::pin(async {
            debug!("NoOp remote: returning empty batch");
            Ok(Vec::new())
        })
    }
}

/// A record as delivered by the remote, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub revision: Option<u64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Longest quote text produced from a post title, in characters.
pub const MAX_POST_TEXT_CHARS: usize = 150;

impl RemoteRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            text: Some(text.into()),
            category: Some(category.into()),
            ..Default::default()
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Map a title-bearing post (e.g. a JSON placeholder API item) to a quote.
    ///
    /// The id becomes `server_<id>` and the post id is kept as the external
    /// id, so the same post matches across fetches even if the local copy was
    /// re-keyed.
    pub fn from_post(post_id: impl std::fmt::Display, title: &str) -> Self {
        let post_id = post_id.to_string();
        Self {
            id: Some(format!("server_{}", post_id)),
            text: Some(format_post_title(title)),
            category: Some("server".to_string()),
            external_id: Some(post_id),
            ..Default::default()
        }
    }

    /// Validate and convert into a [`Record`].
    ///
    /// A missing id is derived from the external id (`server_<external_id>`).
    pub fn into_record(self, now: DateTime<Utc>) -> Result<Record> {
        let id = match (self.id, &self.external_id) {
            (Some(id), _) if !id.trim().is_empty() => id.trim().to_string(),
            (_, Some(ext)) if !ext.trim().is_empty() => format!("server_{}", ext.trim()),
            _ => {
                return Err(QuoteSyncError::Validation(
                    "remote record has neither id nor external_id".into(),
                ))
            }
        };
        let text = self.text.unwrap_or_default();
        let category = self.category.unwrap_or_default();

        let mut record = Record::new(
            RecordId::new(id),
            &text,
            &category,
            RecordSource::Remote,
            self.updated_at.unwrap_or(now),
        )?;
        if let Some(revision) = self.revision {
            record.revision = revision.max(1);
        }
        record.external_id = self.external_id.filter(|e| !e.trim().is_empty());
        record.author = self.author.filter(|a| !a.trim().is_empty());
        Ok(record)
    }
}

/// Trim, capitalize, terminate and cap a post title.
///
/// Blank titles stay blank so ingestion rejects them.
pub fn format_post_title(title: &str) -> String {
    let trimmed = title.trim();
    let mut chars = trimmed.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };

    let mut text: String = first.to_uppercase().chain(chars).collect();
    if !(text.ends_with('.') || text.ends_with('!') || text.ends_with('?')) {
        text.push('.');
    }
    if text.chars().count() > MAX_POST_TEXT_CHARS {
        let mut capped: String = text.chars().take(MAX_POST_TEXT_CHARS - 3).collect();
        capped.push_str("...");
        text = capped;
    }
    text
}

/// Validate a fetched batch, dropping items that fail.
pub fn ingest(batch: Vec<RemoteRecord>, now: DateTime<Utc>) -> Vec<Record> {
    let total = batch.len();
    let mut records = Vec::with_capacity(total);
    for (index, item) in batch.into_iter().enumerate() {
        let id = item.id.clone();
        match item.into_record(now) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(index, id = ?id, error = %e, "Skipping invalid remote record");
                crate::metrics::remote_records_rejected();
            }
        }
    }
    debug!(total, accepted = records.len(), "Remote batch ingested");
    records
}
