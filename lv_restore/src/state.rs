use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use lv_types::CheckpointData;
use parking_lot::Mutex;

/// Per-`(session, content_type)` mutable state shared by every worker
/// restoring that pair.
#[derive(Debug)]
pub(crate) struct RestoreState {
    checkpoint: Mutex<CheckpointData>,
    items_since_checkpoint: AtomicU32,
    total_restored: AtomicI64,
    total_failed: AtomicI64,
}

impl RestoreState {
    pub(crate) fn new(initial: CheckpointData) -> Self {
        Self {
            checkpoint: Mutex::new(initial),
            items_since_checkpoint: AtomicU32::new(0),
            total_restored: AtomicI64::new(0),
            total_failed: AtomicI64::new(0),
        }
    }

    pub(crate) fn checkpoint_snapshot(&self) -> CheckpointData {
        self.checkpoint.lock().clone()
    }

    pub(crate) fn total_restored(&self) -> i64 {
        self.total_restored.load(Ordering::Relaxed)
    }

    pub(crate) fn total_failed(&self) -> i64 {
        self.total_failed.load(Ordering::Relaxed)
    }

    pub(crate) fn is_completed(&self, id: &str) -> bool {
        self.checkpoint.lock().is_completed(id)
    }

    /// Returns the running count of items processed since the last
    /// checkpoint flush.
    pub(crate) fn record_success(&self, id: &str) -> u32 {
        self.checkpoint.lock().mark_completed(id);
        self.total_restored.fetch_add(1, Ordering::Relaxed);
        self.items_since_checkpoint.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_failure(&self, id: &str) -> u32 {
        self.checkpoint.lock().mark_completed(id);
        self.total_failed.fetch_add(1, Ordering::Relaxed);
        self.items_since_checkpoint.fetch_add(1, Ordering::Relaxed) + 1
    }
}
