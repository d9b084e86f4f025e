// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync scheduler.
//!
//! Drives sync sessions between the local [`RecordStore`] and a
//! [`RemoteSource`]:
//! - Timer, manual and reconnect triggers, with at most one session at a time
//! - Conflict detection against the fetched batch
//! - Automatic server-wins resolution, or a parked `ConflictPending` session
//!   the caller drains with [`SyncScheduler::resolve_next`]
//! - One store write plus persisted counters per completed session
//!
//! # Architecture
//!
//! Sessions stage their changes into the store in memory and write once in
//! the Persisting step. A failure anywhere reports to the [`StatusSink`],
//! returns the phase to `Idle`, and leaves the scheduler running. See
//! [`types`] for the state diagrams.

mod counters;
mod session;
mod timer;
pub mod types;

pub use types::{
    ResolveOutcome, SchedulerState, SchedulerStatus, SyncCounters, SyncOutcome, SyncPhase, SyncReport,
    SyncTrigger,
};

use crate::circuit_breaker::FetchCircuit;
use crate::config::{AutoResolveMode, QuoteSyncConfig, SchedulerConfig};
use crate::detector::{self, Conflict};
use crate::error::{QuoteSyncError, Result};
use crate::kv::KvStore;
use crate::metrics;
use crate::notify::{self, Notification, StatusSink};
use crate::record::Record;
use crate::remote::{self, NoOpRemote, RemoteRecord, RemoteSource};
use crate::store::RecordStore;
use crate::strategy::{self, Strategy};
use session::{SessionGuard, SyncSession};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// The sync scheduler.
///
/// Shared as `Arc<SyncScheduler<..>>`: [`start`](Self::start) needs the
/// `Arc` to hand the timer task a weak reference.
pub struct SyncScheduler<K: KvStore, R: RemoteSource = NoOpRemote> {
    config: SchedulerConfig,
    store: Arc<RecordStore<K>>,
    remote: Arc<R>,
    sink: Arc<dyn StatusSink>,
    circuit: FetchCircuit,

    /// Set while a session runs or is parked.
    in_progress: AtomicBool,
    online: AtomicBool,

    phase_tx: watch::Sender<SyncPhase>,
    state_tx: watch::Sender<SchedulerState>,
    shutdown_tx: watch::Sender<bool>,

    /// Session waiting in `ConflictPending`.
    parked: Mutex<Option<SyncSession>>,
    counters: Mutex<SyncCounters>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<K: KvStore, R: RemoteSource> SyncScheduler<K, R> {
    /// Build a scheduler over an opened store.
    ///
    /// Validates `config` and loads the persisted counters through the
    /// store's KV backend, under the store's configured keys. A store left
    /// dirty by a failed write is flushed once; if that fails too the error
    /// goes to `sink` and the next session retries.
    pub async fn open(
        config: &QuoteSyncConfig,
        store: Arc<RecordStore<K>>,
        remote: Arc<R>,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self> {
        config.validate()?;

        let loaded = counters::load(store.kv().as_ref(), store.config()).await?;
        info!(
            sync_count = loaded.sync_count,
            conflicts_resolved = loaded.conflicts_resolved,
            last_sync = ?loaded.last_sync,
            auto_resolve = config.scheduler.auto_resolve,
            "Sync scheduler created"
        );

        // A store whose initial write failed is still dirty
        if store.is_dirty() {
            if let Err(e) = store.flush().await {
                warn!(error = %e, "Pending store write still failing");
                notify::deliver(sink.as_ref(), &Notification::error(&e));
            }
        }

        let (phase_tx, _) = watch::channel(SyncPhase::Idle);
        let (state_tx, _) = watch::channel(SchedulerState::Created);
        let (shutdown_tx, _) = watch::channel(false);
        metrics::set_scheduler_state("Created");
        metrics::set_sync_phase("Idle");

        Ok(Self {
            config: config.scheduler.clone(),
            store,
            remote,
            sink,
            circuit: FetchCircuit::new(&config.circuit),
            in_progress: AtomicBool::new(false),
            online: AtomicBool::new(true),
            phase_tx,
            state_tx,
            shutdown_tx,
            parked: Mutex::new(None),
            counters: Mutex::new(loaded),
            timer: Mutex::new(None),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<RecordStore<K>> {
        &self.store
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    pub fn circuit(&self) -> &FetchCircuit {
        &self.circuit
    }

    pub fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase_tx.borrow()
    }

    /// Watch phase transitions.
    pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase_tx.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub async fn counters(&self) -> SyncCounters {
        self.counters.lock().await.clone()
    }

    /// Conflicts still queued in a parked session, head first.
    pub async fn pending_conflicts(&self) -> Vec<Conflict> {
        self.parked
            .lock()
            .await
            .as_ref()
            .map(|s| s.pending.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn status(&self) -> SchedulerStatus {
        let pending_conflicts = self.parked.lock().await.as_ref().map_or(0, |s| s.pending.len());
        SchedulerStatus {
            state: self.state(),
            phase: self.phase(),
            in_progress: self.is_in_progress(),
            pending_conflicts,
            online: self.is_online(),
            record_count: self.store.len().await,
            counters: self.counters().await,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Spawn the periodic timer. Only valid from `Created`.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut timer_slot = self.timer.lock().await;

        let mut actual = SchedulerState::Created;
        let started = self.state_tx.send_if_modified(|state| {
            actual = *state;
            if *state == SchedulerState::Created {
                *state = SchedulerState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(QuoteSyncError::InvalidState {
                expected: "Created".to_string(),
                actual: actual.to_string(),
            });
        }
        metrics::set_scheduler_state("Running");

        let handle = tokio::spawn(timer::run_timer(
            Arc::downgrade(self),
            self.config.clone(),
            self.shutdown_tx.subscribe(),
        ));
        *timer_slot = Some(handle);

        info!(interval = %self.config.interval, sync_on_start = self.config.sync_on_start, "Sync scheduler started");
        Ok(())
    }

    /// Stop the scheduler. Only valid from `Running`, so only once.
    ///
    /// Shutdown sequence:
    /// 1. Refuse new triggers and signal the timer
    /// 2. Wait for the timer task (bounded by `shutdown_timeout`)
    /// 3. Wait for a running manual session to wind down (same bound)
    /// 4. Abandon any parked session
    /// 5. Flush the store and persist counters
    /// 6. Notify `idle`
    ///
    /// A session still running once the scheduler is `Stopped` fails with
    /// [`QuoteSyncError::Shutdown`] before its Persisting step and never
    /// writes; whatever it staged is written by step 5.
    ///
    /// Steps 5 and 6 run even if one of the writes fails; the first failure
    /// is reported to the sink and returned.
    pub async fn stop(&self) -> Result<()> {
        let mut actual = SchedulerState::Running;
        let stopping = self.state_tx.send_if_modified(|state| {
            actual = *state;
            if *state == SchedulerState::Running {
                *state = SchedulerState::Stopped;
                true
            } else {
                false
            }
        });
        if !stopping {
            return Err(QuoteSyncError::InvalidState {
                expected: "Running".to_string(),
                actual: actual.to_string(),
            });
        }
        metrics::set_scheduler_state("Stopped");
        info!("Stopping sync scheduler");

        self.shutdown_tx.send_replace(true);

        let timeout = self.config.shutdown_timeout_duration();
        let handle = self.timer.lock().await.take();
        if let Some(mut handle) = handle {
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(())) => debug!("Sync timer exited"),
                Ok(Err(e)) => warn!(error = %e, "Sync timer panicked"),
                Err(_) => {
                    warn!(timeout_ms = timeout.as_millis() as u64, "Sync timer did not exit in time, aborting");
                    handle.abort();
                }
            }
        }

        let mut phase_rx = self.phase_tx.subscribe();
        let settled = phase_rx.wait_for(|phase| *phase == SyncPhase::ConflictPending || !self.is_in_progress());
        if tokio::time::timeout(timeout, settled).await.is_err() {
            warn!(timeout_ms = timeout.as_millis() as u64, "Running sync session did not settle in time");
        }

        if let Some(session) = self.parked.lock().await.take() {
            drop(SessionGuard::resume(&self.in_progress, &self.phase_tx));
            info!(dropped = session.pending.len(), "Parked sync session abandoned on stop");
        }

        let mut first_error = None;
        if let Err(e) = self.store.flush().await {
            warn!(error = %e, "Store flush failed during stop");
            first_error.get_or_insert(e);
        }
        let counters = self.counters().await;
        if let Err(e) = counters::save(self.store.kv().as_ref(), self.store.config(), &counters).await {
            warn!(error = %e, "Counter save failed during stop");
            first_error.get_or_insert(e);
        }

        if let Some(e) = &first_error {
            self.notify(Notification::error(e));
        }
        self.notify(Notification::idle("Sync stopped"));
        info!(sync_count = counters.sync_count, "Sync scheduler stopped");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Update connectivity.
    ///
    /// Coming back online is a reconnection event and runs a sync
    /// immediately; the outcome is returned.
    pub async fn set_online(&self, online: bool) -> Result<Option<SyncOutcome>> {
        let was_online = self.online.swap(online, Ordering::AcqRel);
        match (was_online, online) {
            (false, true) => {
                info!("Connection restored");
                if self.state() == SchedulerState::Stopped {
                    return Ok(None);
                }
                self.trigger(SyncTrigger::Reconnect).await.map(Some)
            }
            (true, false) => {
                info!("Connection lost, sync paused");
                self.notify(Notification::idle("Offline, sync paused"));
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Sessions
    // ═══════════════════════════════════════════════════════════════════════

    /// Run a manual sync.
    pub async fn sync_now(&self) -> Result<SyncOutcome> {
        self.trigger(SyncTrigger::Manual).await
    }

    /// Run one sync session.
    ///
    /// Returns `Skipped` without waiting if a session is already running or
    /// parked, and `Offline` without fetching while connectivity is down.
    /// Dropping the returned future mid-session releases the in-progress
    /// flag; whatever was staged stays in memory and is written by the next
    /// flush.
    #[instrument(skip_all, fields(trigger = %trigger))]
    pub async fn trigger(&self, trigger: SyncTrigger) -> Result<SyncOutcome> {
        if self.state() == SchedulerState::Stopped {
            return Err(QuoteSyncError::Shutdown);
        }
        if !self.is_online() {
            metrics::record_sync_skipped("offline");
            debug!("Offline, sync not attempted");
            return Ok(SyncOutcome::Offline);
        }
        let Some(guard) = SessionGuard::acquire(&self.in_progress, &self.phase_tx) else {
            metrics::record_sync_skipped("in_progress");
            debug!("Sync already in progress, trigger skipped");
            return Ok(SyncOutcome::Skipped);
        };
        if self.state() == SchedulerState::Stopped {
            return Err(QuoteSyncError::Shutdown);
        }

        metrics::record_sync_attempt(trigger.as_str());
        self.run_session(SyncSession::new(trigger), guard).await
    }

    async fn run_session(&self, mut session: SyncSession, guard: SessionGuard<'_>) -> Result<SyncOutcome> {
        self.set_phase(SyncPhase::Fetching);
        self.notify(Notification::syncing("Checking for updates from server"));

        let batch = match self.fetch().await {
            Ok(batch) => batch,
            Err(e) => return Err(self.fail("fetching", e)),
        };

        session.received = batch.len();
        let incoming = remote::ingest(batch, self.store.clock().now());
        session.accepted = incoming.len();

        self.set_phase(SyncPhase::Detecting);
        let local = self.store.get_all().await;
        let analysis = detector::analyze(&local, &incoming);
        session.conflicts = analysis.conflicts.len();
        session.unchanged = analysis.unchanged;
        session.additions = analysis.additions;
        metrics::record_conflicts_detected(session.conflicts);

        if analysis.conflicts.is_empty() {
            session.merge_additions = true;
            let report = self.complete(session).await?;
            drop(guard);
            return Ok(SyncOutcome::Completed(report));
        }

        if self.config.auto_resolve {
            self.set_phase(SyncPhase::Resolving);
            session.merge_additions = true;
            self.auto_resolve(&mut session, &analysis.conflicts, &incoming).await;
            let report = self.complete(session).await?;
            drop(guard);
            return Ok(SyncOutcome::Completed(report));
        }

        let conflicts = analysis.conflicts.len();
        session.pending = analysis.conflicts.into();

        let mut slot = self.parked.lock().await;
        *slot = Some(session);
        self.set_phase(SyncPhase::ConflictPending);
        guard.park();
        drop(slot);

        info!(conflicts, "Sync waiting for conflict resolution");
        self.notify(Notification::conflict(format!(
            "{} conflict(s) need resolution",
            conflicts
        )));
        Ok(SyncOutcome::ConflictPending { conflicts })
    }

    /// Resolve the head of the parked conflict queue with `strategy`.
    ///
    /// When the queue drains the session persists. Remote additions are only
    /// merged if some conflict in the session was resolved with
    /// [`Strategy::Merge`].
    #[instrument(skip_all, fields(strategy = strategy.as_str()))]
    pub async fn resolve_next(&self, strategy: Strategy) -> Result<ResolveOutcome> {
        let mut slot = self.parked.lock().await;
        let Some(mut session) = slot.take() else {
            return Err(QuoteSyncError::InvalidState {
                expected: "ConflictPending".to_string(),
                actual: self.phase().to_string(),
            });
        };
        let guard = SessionGuard::resume(&self.in_progress, &self.phase_tx);

        if let Some(conflict) = session.pending.pop_front() {
            self.set_phase(SyncPhase::Resolving);
            let now = self.store.clock().now();
            let additions = &session.additions;
            let resolution = self
                .store
                .stage(|current| strategy::resolve(strategy, current, &conflict, additions, now))
                .await;
            session.resolved += 1;
            if strategy == Strategy::Merge {
                session.merge_additions = true;
                session.added += resolution.added;
            }
            metrics::record_conflict_resolved(strategy.as_str());
            info!(
                id = %conflict.id,
                remaining = session.pending.len(),
                outcome = %resolution.outcome,
                "Conflict resolved"
            );

            if !session.pending.is_empty() {
                let remaining = session.pending.len();
                let message = format!("{}. {} conflict(s) remaining", resolution.outcome, remaining);
                *slot = Some(session);
                self.set_phase(SyncPhase::ConflictPending);
                guard.park();
                drop(slot);

                self.notify(Notification::conflict(message.clone()));
                return Ok(ResolveOutcome::Pending { remaining, message });
            }
        }
        drop(slot);

        let report = self.complete(session).await?;
        drop(guard);
        Ok(ResolveOutcome::Completed(report))
    }

    /// Drop a parked session without resolving the rest of its queue.
    ///
    /// Resolutions already applied stay in memory and are flushed. Returns
    /// the number of conflicts left unresolved, or the write error if the
    /// flush failed; the session is gone either way.
    pub async fn abandon(&self) -> Result<usize> {
        let mut slot = self.parked.lock().await;
        let Some(session) = slot.take() else {
            return Err(QuoteSyncError::InvalidState {
                expected: "ConflictPending".to_string(),
                actual: self.phase().to_string(),
            });
        };
        let guard = SessionGuard::resume(&self.in_progress, &self.phase_tx);
        drop(slot);

        let dropped = session.pending.len();
        let flushed = self.store.flush().await;
        drop(guard);

        info!(dropped, resolved = session.resolved, "Parked sync session abandoned");
        if let Err(e) = flushed {
            warn!(error = %e, "Flush after abandon failed, store stays dirty");
            self.notify(Notification::error(&e));
            return Err(e);
        }
        self.notify(Notification::idle(format!(
            "Sync abandoned, {} conflict(s) left unresolved",
            dropped
        )));
        Ok(dropped)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Session steps
    // ═══════════════════════════════════════════════════════════════════════

    async fn fetch(&self) -> Result<Vec<RemoteRecord>> {
        let fetch = self.circuit.fetch(self.remote.as_ref());
        match self.config.fetch_timeout_duration() {
            Some(limit) => tokio::time::timeout(limit, fetch).await.unwrap_or_else(|_| {
                Err(QuoteSyncError::Fetch(format!(
                    "remote fetch timed out after {}",
                    humantime::format_duration(limit)
                )))
            }),
            None => fetch.await,
        }
    }

    async fn auto_resolve(&self, session: &mut SyncSession, conflicts: &[Conflict], incoming: &[Record]) {
        match self.config.auto_resolve_mode {
            AutoResolveMode::PerConflict => {
                for conflict in conflicts {
                    let now = self.store.clock().now();
                    let resolution = self
                        .store
                        .stage(|current| strategy::server_wins(current, conflict, now))
                        .await;
                    session.resolved += 1;
                    metrics::record_conflict_resolved(Strategy::ServerWins.as_str());
                    debug!(id = %conflict.id, outcome = %resolution.outcome, "Conflict auto-resolved");
                }
            }
            AutoResolveMode::ReplaceAll => {
                let resolution = self
                    .store
                    .stage(|current| strategy::replace_with_batch(current, incoming))
                    .await;
                session.resolved += conflicts.len();
                for _ in conflicts {
                    metrics::record_conflict_resolved("replace_all");
                }
                info!(outcome = %resolution.outcome, "Local quotes replaced by remote batch");
            }
        }
    }

    /// Merge additions if the session carries them, then Persisting: flush,
    /// bump and save counters.
    async fn complete(&self, mut session: SyncSession) -> Result<SyncReport> {
        if self.state() == SchedulerState::Stopped {
            return Err(self.fail("persisting", QuoteSyncError::Shutdown));
        }
        if session.merge_additions && !session.additions.is_empty() {
            let merged = self
                .store
                .stage(|current| strategy::merge(current, &session.additions))
                .await;
            session.added += merged.added;
        }
        metrics::record_records_added(session.added);

        self.set_phase(SyncPhase::Persisting);
        let now = self.store.clock().now();
        if let Err(e) = self.persist_session(session.resolved, now).await {
            return Err(self.fail("persisting", e));
        }

        let report = session.report(now);
        metrics::record_sync_completed(report.duration);
        info!(
            trigger = %report.trigger,
            received = report.received,
            added = report.added,
            resolved = report.resolved,
            unchanged = report.unchanged,
            duration_ms = report.duration.as_millis() as u64,
            "Sync completed"
        );
        self.notify(Notification::success(report.summary()));
        Ok(report)
    }

    async fn persist_session(&self, resolved: usize, now: chrono::DateTime<chrono::Utc>) -> Result<()> {
        self.store.flush().await?;

        let mut counters = self.counters.lock().await;
        counters.sync_count += 1;
        counters.conflicts_resolved += resolved as u64;
        counters.last_sync = Some(now);
        counters::save(self.store.kv().as_ref(), self.store.config(), &counters).await
    }

    /// Report a session failure and wrap it with the phase it happened in.
    fn fail(&self, phase: &str, err: QuoteSyncError) -> QuoteSyncError {
        self.set_phase(SyncPhase::Error);
        let err = QuoteSyncError::sync(phase, err);
        warn!(phase, error = %err, "Sync session failed");
        metrics::record_sync_failed(err.root_kind().as_str());
        self.notify(Notification::error(&err));
        err
    }

    fn set_phase(&self, phase: SyncPhase) {
        let previous = self.phase_tx.send_replace(phase);
        if previous != phase {
            debug!(from = %previous, to = %phase, "Sync phase changed");
        }
        metrics::set_sync_phase(&phase.to_string());
    }

    fn notify(&self, notification: Notification) {
        notify::deliver(self.sink.as_ref(), &notification);
    }
}
