// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-session state and the in-progress guard.

use super::types::{SyncPhase, SyncReport, SyncTrigger};
use crate::detector::Conflict;
use crate::record::Record;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio::time::Instant;

/// Everything one sync session has learned so far.
///
/// Lives on the stack while the session runs and moves into the scheduler's
/// parking slot when the session waits for caller decisions.
#[derive(Debug)]
pub(crate) struct SyncSession {
    pub trigger: SyncTrigger,
    pub started: Instant,
    pub received: usize,
    pub accepted: usize,
    pub conflicts: usize,
    pub unchanged: usize,
    /// Unresolved conflicts, head first.
    pub pending: VecDeque<Conflict>,
    /// Remote records with no local counterpart.
    pub additions: Vec<Record>,
    /// Merge `additions` when the session closes. Set for conflict-free and
    /// auto-resolved sessions, and once a caller resolves with merge.
    pub merge_additions: bool,
    pub resolved: usize,
    pub added: usize,
}

impl SyncSession {
    pub fn new(trigger: SyncTrigger) -> Self {
        Self {
            trigger,
            started: Instant::now(),
            received: 0,
            accepted: 0,
            conflicts: 0,
            unchanged: 0,
            pending: VecDeque::new(),
            additions: Vec::new(),
            merge_additions: false,
            resolved: 0,
            added: 0,
        }
    }

    pub fn report(&self, completed_at: DateTime<Utc>) -> SyncReport {
        SyncReport {
            trigger: self.trigger,
            received: self.received,
            accepted: self.accepted,
            conflicts: self.conflicts,
            resolved: self.resolved,
            added: self.added,
            unchanged: self.unchanged,
            duration: self.started.elapsed(),
            completed_at,
        }
    }
}

/// Owns the `in_progress` flag for the lifetime of a running session.
///
/// Dropping the guard (normal return, error, or the trigger future being
/// dropped mid-await) clears the flag and puts the phase back to `Idle`.
/// A parked session disarms it; the flag stays set until the queue is
/// drained or abandoned.
pub(crate) struct SessionGuard<'a> {
    in_progress: &'a AtomicBool,
    phase_tx: &'a watch::Sender<SyncPhase>,
    armed: bool,
}

impl<'a> SessionGuard<'a> {
    /// Claim the flag. `None` if a session already holds it.
    pub fn acquire(in_progress: &'a AtomicBool, phase_tx: &'a watch::Sender<SyncPhase>) -> Option<Self> {
        in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                in_progress,
                phase_tx,
                armed: true,
            })
    }

    /// Take over a flag already held by a parked session.
    pub fn resume(in_progress: &'a AtomicBool, phase_tx: &'a watch::Sender<SyncPhase>) -> Self {
        Self {
            in_progress,
            phase_tx,
            armed: true,
        }
    }

    /// Leave the flag set; the parked session now owns it.
    pub fn park(mut self) {
        self.armed = false;
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            // Flag first so phase watchers see it cleared on `Idle`
            self.in_progress.store(false, Ordering::Release);
            self.phase_tx.send_replace(SyncPhase::Idle);
            crate::metrics::set_sync_phase("Idle");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_excludes_second_session() {
        let flag = AtomicBool::new(false);
        let (tx, _rx) = watch::channel(SyncPhase::Idle);

        let first = SessionGuard::acquire(&flag, &tx);
        assert!(first.is_some());
        assert!(SessionGuard::acquire(&flag, &tx).is_none());

        drop(first);
        assert!(!flag.load(Ordering::SeqCst));
        assert!(SessionGuard::acquire(&flag, &tx).is_some());
    }

    #[test]
    fn test_guard_drop_returns_phase_to_idle() {
        let flag = AtomicBool::new(false);
        let (tx, rx) = watch::channel(SyncPhase::Idle);

        let guard = SessionGuard::acquire(&flag, &tx).unwrap();
        tx.send_replace(SyncPhase::Fetching);
        drop(guard);

        assert_eq!(*rx.borrow(), SyncPhase::Idle);
    }

    #[test]
    fn test_parked_guard_keeps_flag() {
        let flag = AtomicBool::new(false);
        let (tx, rx) = watch::channel(SyncPhase::Idle);

        let guard = SessionGuard::acquire(&flag, &tx).unwrap();
        tx.send_replace(SyncPhase::ConflictPending);
        guard.park();

        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(*rx.borrow(), SyncPhase::ConflictPending);

        drop(SessionGuard::resume(&flag, &tx));
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_report_copies_counts() {
        let mut session = SyncSession::new(SyncTrigger::Manual);
        session.received = 4;
        session.accepted = 3;
        session.added = 2;
        session.resolved = 1;
        let report = session.report(Utc::now());
        assert_eq!(report.trigger, SyncTrigger::Manual);
        assert_eq!((report.received, report.accepted), (4, 3));
        assert_eq!((report.added, report.resolved), (2, 1));
    }
}
