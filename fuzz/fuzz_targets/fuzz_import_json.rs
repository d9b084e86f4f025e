//! Fuzz target for JSON import.
//!
//! Import must never panic on arbitrary input, and whatever it accepts must
//! leave the store with unique ids and valid content.

#![no_main]

use libfuzzer_sys::fuzz_target;
use quote_sync::{ManualClock, MemoryKv, RecordStore, StoreConfig};
use std::collections::HashSet;
use std::sync::Arc;

fuzz_target!(|data: &str| {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();

    runtime.block_on(async {
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let store = RecordStore::open(Arc::new(MemoryKv::new()), StoreConfig::default(), clock)
            .await
            .unwrap();
        let before = store.len().await;

        // Should never panic
        let imported = match store.import_json(data).await {
            Ok(n) => n,
            Err(_) => 0,
        };

        let records = store.get_all().await;
        assert_eq!(records.len(), before + imported);

        let ids: HashSet<_> = records.iter().map(|r| &r.id).collect();
        assert_eq!(ids.len(), records.len());
        for record in &records {
            assert!(record.validate().is_ok());
            assert!(record.revision >= 1);
        }
    });
});
