//! Fuzz target for remote batch ingestion and conflict detection.
//!
//! Arbitrary JSON batches must never panic ingestion or analysis, and every
//! accepted record must be valid.

#![no_main]

use libfuzzer_sys::fuzz_target;
use quote_sync::detector::analyze;
use quote_sync::record::default_records;
use quote_sync::remote::{format_post_title, ingest, RemoteRecord, MAX_POST_TEXT_CHARS};

fuzz_target!(|data: &[u8]| {
    let now = chrono::Utc::now();

    if let Ok(batch) = serde_json::from_slice::<Vec<RemoteRecord>>(data) {
        let total = batch.len();
        let accepted = ingest(batch, now);
        assert!(accepted.len() <= total);
        for record in &accepted {
            assert!(record.validate().is_ok());
            assert!(record.revision >= 1);
        }

        let local = default_records(now);
        let analysis = analyze(&local, &accepted);
        assert!(analysis.conflicts.len() <= local.len());
        assert!(analysis.conflicts.len() + analysis.additions.len() + analysis.unchanged <= accepted.len());
    }

    // Post titles come straight off the wire
    if let Ok(title) = std::str::from_utf8(data) {
        let text = format_post_title(title);
        assert!(text.chars().count() <= MAX_POST_TEXT_CHARS);
    }
});
