// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The quote record schema.
//!
//! One [`Record`] shape covers every origin (local add, remote fetch, import,
//! merge). Optional metadata such as the remote's own id or an author lives in
//! optional fields and is validated once at ingestion.
//!
//! # Invariants
//!
//! - `text` and `category` are non-empty after trimming
//! - `revision` starts at 1 and strictly increases on each mutation of an id
//! - `id` uniqueness is enforced by the store, not the record

use crate::error::{QuoteSyncError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a record within the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id (`quote_<uuid>`).
    pub fn generate() -> Self {
        Self(format!("quote_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Where a record's current content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Local,
    Remote,
    Merged,
    Imported,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Merged => "merged",
            Self::Imported => "imported",
        }
    }
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_revision() -> u64 {
    1
}

/// A single quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub text: String,
    pub category: String,
    pub source: RecordSource,
    #[serde(default = "default_revision")]
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
    /// Identity assigned by the remote, used as a fallback match key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl Record {
    /// Build a validated record at revision 1.
    ///
    /// Text and category are stored trimmed.
    pub fn new(
        id: RecordId,
        text: &str,
        category: &str,
        source: RecordSource,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let (text, category) = validate_content(text, category)?;
        Ok(Self {
            id,
            text,
            category,
            source,
            revision: 1,
            updated_at: now,
            external_id: None,
            author: None,
        })
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Re-check content invariants (used for records arriving from outside).
    pub fn validate(&self) -> Result<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(QuoteSyncError::Validation("record id is empty".into()));
        }
        validate_content(&self.text, &self.category).map(|_| ())
    }
}

/// Trim and check text/category, returning the trimmed pair.
pub fn validate_content(text: &str, category: &str) -> Result<(String, String)> {
    let text = text.trim();
    let category = category.trim();
    if text.is_empty() {
        return Err(QuoteSyncError::Validation(
            "quote text must not be empty".into(),
        ));
    }
    if category.is_empty() {
        return Err(QuoteSyncError::Validation(
            "quote category must not be empty".into(),
        ));
    }
    Ok((text.to_string(), category.to_string()))
}

/// Partial update for [`RecordStore::update`](crate::store::RecordStore::update).
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub text: Option<String>,
    pub category: Option<String>,
    pub source: Option<RecordSource>,
    pub external_id: Option<String>,
    pub author: Option<String>,
}

impl RecordPatch {
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn source(mut self, source: RecordSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Produce the patched record with a bumped revision.
    ///
    /// Fails without touching `record` if a provided text or category is
    /// blank.
    pub fn apply(&self, record: &Record, now: DateTime<Utc>) -> Result<Record> {
        let text = self.text.as_deref().unwrap_or(&record.text);
        let category = self.category.as_deref().unwrap_or(&record.category);
        let (text, category) = validate_content(text, category)?;

        let mut next = record.clone();
        next.text = text;
        next.category = category;
        if let Some(source) = self.source {
            next.source = source;
        }
        if let Some(ref external_id) = self.external_id {
            next.external_id = Some(external_id.clone());
        }
        if let Some(ref author) = self.author {
            next.author = Some(author.clone());
        }
        next.revision = record.revision + 1;
        next.updated_at = now;
        Ok(next)
    }
}

const DEFAULT_QUOTES: [(&str, &str, &str); 5] = [
    ("1", "The only way to do great work is to love what you do.", "motivation"),
    ("2", "Innovation distinguishes between a leader and a follower.", "innovation"),
    ("3", "Life is what happens to you while you're busy making other plans.", "life"),
    ("4", "The future belongs to those who believe in the beauty of their dreams.", "dreams"),
    (
        "5",
        "Success is not final, failure is not fatal: it is the courage to continue that counts.",
        "success",
    ),
];

/// Seed set used when storage holds no record set yet.
pub fn default_records(now: DateTime<Utc>) -> Vec<Record> {
    DEFAULT_QUOTES
        .iter()
        .map(|(id, text, category)| Record {
            id: RecordId::new(*id),
            text: text.to_string(),
            category: category.to_string(),
            source: RecordSource::Local,
            revision: 1,
            updated_at: now,
            external_id: None,
            author: None,
        })
        .collect()
}
