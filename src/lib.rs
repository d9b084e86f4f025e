//! # Quote Sync
//!
//! A local quote store kept in step with a remote source, with conflict
//! detection and pluggable resolution.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                                quote-sync                                 │
//! │                                                                           │
//! │  ┌──────────────┐    ┌──────────────┐    ┌─────────────────────────────┐  │
//! │  │ RemoteSource │───►│ ingest       │───►│ detector::analyze           │  │
//! │  │ (+ circuit)  │    │ (validation) │    │ (conflicts + additions)     │  │
//! │  └──────────────┘    └──────────────┘    └─────────────────────────────┘  │
//! │         ▲                                            │                    │
//! │         │                                            ▼                    │
//! │  ┌──────────────┐                          ┌─────────────────────────┐    │
//! │  │ SyncScheduler│─────────────────────────►│ strategy (server/local/ │    │
//! │  │ (timer/manual│                          │ merge/replace_all)      │    │
//! │  │  /reconnect) │                          └─────────────────────────┘    │
//! │  └──────────────┘                                        │                │
//! │         │                                                ▼                │
//! │         ▼                                      ┌───────────────────┐      │
//! │  ┌──────────────┐                              │ RecordStore       │      │
//! │  │ StatusSink   │                              │ (KvStore: memory, │      │
//! │  └──────────────┘                              │  SQLite)          │      │
//! │                                                └───────────────────┘      │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use quote_sync::{NoOpRemote, QuoteSyncConfig, RecordStore, SqliteKv, SyncScheduler, SystemClock, TracingSink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> quote_sync::Result<()> {
//!     let config = QuoteSyncConfig::default();
//!     let kv = Arc::new(SqliteKv::open(&config.kv).await?);
//!     let store = Arc::new(RecordStore::open(kv, config.store.clone(), Arc::new(SystemClock)).await?);
//!
//!     let scheduler = Arc::new(
//!         SyncScheduler::open(&config, store, Arc::new(NoOpRemote), Arc::new(TracingSink)).await?,
//!     );
//!     scheduler.start().await?;
//!
//!     // Runs until stopped
//!     scheduler.stop().await
//! }
//! ```

pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod detector;
pub mod error;
pub mod identity;
pub mod kv;
pub mod metrics;
pub mod notify;
pub mod record;
pub mod remote;
pub mod scheduler;
pub mod sqlite_kv;
pub mod store;
pub mod strategy;

// Re-exports for convenience
pub use circuit_breaker::{CircuitBreaker, CircuitError, FetchCircuit};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AutoResolveMode, CircuitConfig, KvConfig, QuoteSyncConfig, SchedulerConfig, StoreConfig};
pub use detector::{Analysis, Conflict, ConflictKind};
pub use error::{ErrorKind, QuoteSyncError, Result};
pub use kv::{KvError, KvStore, MemoryKv};
pub use notify::{BroadcastSink, Notification, StatusSink, SyncStatus, TracingSink};
pub use record::{Record, RecordId, RecordPatch, RecordSource};
pub use remote::{FetchError, NoOpRemote, RemoteRecord, RemoteSource};
pub use scheduler::{
    ResolveOutcome, SchedulerState, SchedulerStatus, SyncCounters, SyncOutcome, SyncPhase, SyncReport,
    SyncScheduler, SyncTrigger,
};
pub use sqlite_kv::SqliteKv;
pub use store::{ExportDocument, RecordStore, StoreStats};
pub use strategy::{Resolution, Strategy};
