//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold for all inputs,
//! helping catch edge cases that unit tests might miss.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use quote_sync::detector::{analyze, detect};
use quote_sync::identity::fingerprint;
use quote_sync::remote::{format_post_title, MAX_POST_TEXT_CHARS};
use quote_sync::strategy::{merge, replace_with_batch, server_wins};
use quote_sync::{Record, RecordId, RecordSource};
use std::collections::{HashMap, HashSet};

fn record(id: String, text: String, category: String, revision: u64) -> Record {
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    Record::new(RecordId::new(id), &text, &category, RecordSource::Local, now)
        .unwrap()
        .with_revision(revision)
}

/// Records with small id and content alphabets so batches overlap.
fn arb_record() -> impl Strategy<Value = Record> {
    ("[0-9]{1,2}", "[a-c]{1,3}", "[xy]", 1u64..5).prop_map(|(id, text, category, revision)| {
        record(id, text, category, revision)
    })
}

/// Records with unique ids.
fn arb_set() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(arb_record(), 0..12).prop_map(|records| {
        let mut seen = HashSet::new();
        records.into_iter().filter(|r| seen.insert(r.id.clone())).collect()
    })
}

// =============================================================================
// Merge Properties
// =============================================================================

proptest! {
    /// Merging the same additions twice equals merging once.
    #[test]
    fn merge_is_idempotent(local in arb_set(), additions in arb_set()) {
        let once = merge(&local, &additions);
        let twice = merge(&once.records, &additions);
        prop_assert_eq!(&twice.records, &once.records);
        prop_assert_eq!(twice.added, 0);
    }

    /// Merge never changes records that were already present.
    #[test]
    fn merge_never_overwrites(local in arb_set(), additions in arb_set()) {
        let merged = merge(&local, &additions);
        prop_assert_eq!(&merged.records[..local.len()], &local[..]);

        let ids: HashSet<_> = merged.records.iter().map(|r| &r.id).collect();
        prop_assert_eq!(ids.len(), merged.records.len());
    }
}

// =============================================================================
// Detector Properties
// =============================================================================

proptest! {
    /// Analysis is a pure function of its inputs.
    #[test]
    fn analyze_is_deterministic(local in arb_set(), remote in prop::collection::vec(arb_record(), 0..12)) {
        prop_assert_eq!(analyze(&local, &remote), analyze(&local, &remote));
    }

    /// A set never conflicts with itself.
    #[test]
    fn no_conflicts_against_self(local in arb_set()) {
        let analysis = analyze(&local, &local);
        prop_assert!(analysis.conflicts.is_empty());
        prop_assert!(analysis.additions.is_empty());
        prop_assert_eq!(analysis.unchanged, local.len());
    }

    /// Every remote record is classified at most once and each local record
    /// matches at most one remote record.
    #[test]
    fn analysis_partitions_remote(local in arb_set(), remote in prop::collection::vec(arb_record(), 0..12)) {
        let analysis = analyze(&local, &remote);
        let classified = analysis.conflicts.len() + analysis.additions.len() + analysis.unchanged;
        prop_assert!(classified <= remote.len());

        let conflict_ids: HashSet<_> = analysis.conflicts.iter().map(|c| &c.id).collect();
        prop_assert_eq!(conflict_ids.len(), analysis.conflicts.len());

        let local_ids: HashSet<_> = local.iter().map(|r| &r.id).collect();
        for addition in &analysis.additions {
            prop_assert!(!local_ids.contains(&addition.id));
        }
        for conflict in &analysis.conflicts {
            prop_assert_ne!(fingerprint(&conflict.local), fingerprint(&conflict.remote));
        }
    }

    /// After merging the additions, the same batch yields no additions.
    #[test]
    fn merged_additions_are_not_found_again(local in arb_set(), remote in arb_set()) {
        let analysis = analyze(&local, &remote);
        let merged = merge(&local, &analysis.additions);
        prop_assert!(analyze(&merged.records, &remote).additions.is_empty());
    }
}

// =============================================================================
// Revision Properties
// =============================================================================

proptest! {
    /// Server-wins strictly increases the resolved record's revision.
    #[test]
    fn server_wins_increases_revision(local in arb_set(), remote in arb_set()) {
        let now = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap();
        let before: HashMap<_, _> = local.iter().map(|r| (r.id.clone(), r.revision)).collect();

        let mut current = local.clone();
        for conflict in detect(&local, &remote) {
            current = server_wins(&current, &conflict, now).records;
            let after = current.iter().find(|r| r.id == conflict.id).unwrap();
            prop_assert!(after.revision > before[&conflict.id]);
            prop_assert_eq!(&after.text, &conflict.remote.text);
        }
    }

    /// Whole-batch replacement never moves a surviving id's revision backwards.
    #[test]
    fn replace_never_decreases_revision(local in arb_set(), batch in prop::collection::vec(arb_record(), 0..12)) {
        let before: HashMap<_, _> = local.iter().map(|r| (r.id.clone(), r.revision)).collect();
        let replaced = replace_with_batch(&local, &batch);

        for record in &replaced.records {
            if let Some(&old) = before.get(&record.id) {
                prop_assert!(record.revision > old);
            }
        }
        let ids: HashSet<_> = replaced.records.iter().map(|r| &r.id).collect();
        prop_assert_eq!(ids.len(), replaced.records.len());
    }
}

// =============================================================================
// Ingestion Properties
// =============================================================================

proptest! {
    /// Post titles are capped and terminated.
    #[test]
    fn post_title_is_capped_and_terminated(title in "\\PC{0,400}") {
        let text = format_post_title(&title);
        prop_assert!(text.chars().count() <= MAX_POST_TEXT_CHARS);
        if !title.trim().is_empty() {
            prop_assert!(text.ends_with('.') || text.ends_with('!') || text.ends_with('?'));
        }
    }

    /// Fingerprints ignore surrounding whitespace and category case.
    #[test]
    fn fingerprint_normalizes(text in "[a-z]{1,10}", category in "[a-z]{1,6}") {
        let plain = record("1".into(), text.clone(), category.clone(), 1);
        let mut noisy = plain.clone();
        noisy.text = format!("  {}\t", text);
        noisy.category = format!(" {} ", category.to_uppercase());
        prop_assert_eq!(fingerprint(&plain), fingerprint(&noisy));
    }
}
