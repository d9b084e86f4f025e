//! Status sinks for assertions.

use quote_sync::notify::{Notification, StatusSink, SyncStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Records every notification it receives.
#[derive(Default)]
pub struct RecordingSink {
    received: Mutex<Vec<Notification>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.received.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<SyncStatus> {
        self.received.lock().unwrap().iter().map(|n| n.status).collect()
    }

    pub fn count(&self, status: SyncStatus) -> usize {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.status == status)
            .count()
    }

    pub fn last(&self) -> Option<Notification> {
        self.received.lock().unwrap().last().cloned()
    }

    pub fn clear(&self) {
        self.received.lock().unwrap().clear();
    }
}

impl StatusSink for RecordingSink {
    fn notify(&self, notification: &Notification) {
        self.received.lock().unwrap().push(notification.clone());
    }
}

/// Panics on every notification, counting attempts.
#[derive(Default)]
pub struct PanickingSink {
    attempts: AtomicUsize,
}

#[allow(dead_code)]
impl PanickingSink {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl StatusSink for PanickingSink {
    fn notify(&self, notification: &Notification) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        panic!("sink failure on {:?}", notification.status);
    }
}
