// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Identity and content fingerprints.
//!
//! Two records are the same entity when their ids match, or, failing that,
//! when both carry the same `external_id`. Same-entity records differ when
//! their normalized content differs: text is trimmed, category is trimmed
//! and case-folded.

use crate::record::Record;
use sha2::{Digest, Sha256};

/// Check whether `a` and `b` refer to the same logical quote.
pub fn same_entity(a: &Record, b: &Record) -> bool {
    if a.id == b.id {
        return true;
    }
    match (&a.external_id, &b.external_id) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

pub fn normalize_text(text: &str) -> &str {
    text.trim()
}

pub fn normalize_category(category: &str) -> String {
    category.trim().to_lowercase()
}

/// SHA-256 hex digest of the normalized content.
pub fn fingerprint(record: &Record) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(&record.text).as_bytes());
    // Separator keeps ("ab","c") and ("a","bc") distinct
    hasher.update([0u8]);
    hasher.update(normalize_category(&record.category).as_bytes());
    hex::encode(hasher.finalize())
}

/// Check whether the content-significant fields differ.
pub fn content_differs(a: &Record, b: &Record) -> bool {
    fingerprint(a) != fingerprint(b)
}
