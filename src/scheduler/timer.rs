// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Periodic sync timer.
//!
//! Fires a `Timer` trigger every `interval`. Ticks that land while a session
//! is running or parked come back as `Skipped` and are dropped, and missed
//! ticks are skipped rather than bursted. A shutdown signal interrupts an
//! in-flight session; its guard puts the phase back to `Idle`.

use super::types::{SyncOutcome, SyncTrigger};
use super::SyncScheduler;
use crate::config::SchedulerConfig;
use crate::kv::KvStore;
use crate::remote::RemoteSource;
use std::sync::Weak;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn, Instrument};

/// Run the timer until shutdown is signaled or the scheduler is dropped.
pub(crate) async fn run_timer<K: KvStore, R: RemoteSource>(
    scheduler: Weak<SyncScheduler<K, R>>,
    config: SchedulerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let span = tracing::info_span!("sync_timer");

    async move {
        // Mark initial shutdown value as seen so changed() only fires on actual changes.
        // stop() may have raced ahead of the spawn.
        if *shutdown_rx.borrow_and_update() {
            info!("Shutdown signaled before sync timer started");
            return;
        }

        let interval = config.interval_duration();
        let first = if config.sync_on_start {
            Instant::now()
        } else {
            Instant::now() + interval
        };

        info!(
            interval_ms = interval.as_millis() as u64,
            sync_on_start = config.sync_on_start,
            "Starting sync timer"
        );

        let mut timer = tokio::time::interval_at(first, interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("Sync timer shutting down");
                        break;
                    }
                    continue;
                }

                _ = timer.tick() => {}
            }

            let Some(scheduler) = scheduler.upgrade() else {
                debug!("Scheduler dropped, sync timer exiting");
                break;
            };

            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    info!("Sync timer interrupted by shutdown");
                    break;
                }

                result = scheduler.trigger(SyncTrigger::Timer) => match result {
                    Ok(SyncOutcome::Completed(report)) => {
                        debug!(added = report.added, resolved = report.resolved, "Timer sync completed");
                    }
                    Ok(SyncOutcome::ConflictPending { conflicts }) => {
                        debug!(conflicts, "Timer sync waiting for conflict resolution");
                    }
                    Ok(SyncOutcome::Skipped) => debug!("Timer tick dropped, session in progress"),
                    Ok(SyncOutcome::Offline) => debug!("Timer tick dropped, offline"),
                    Err(e) => {
                        // Already reported to the sink; the timer keeps going
                        warn!(error = %e, "Timer sync failed");
                    }
                }
            }
        }

        info!("Sync timer stopped");
    }
    .instrument(span)
    .await
}
