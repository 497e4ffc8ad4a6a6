//! Executor counters

use std::sync::atomic::{AtomicU64, Ordering};

use crate::future::TaskOutcome;

/// Point-in-time snapshot of executor activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Tasks admitted, one per child spawned
    pub submitted: u64,
    /// Children that settled with a value
    pub completed: u64,
    /// Children whose body failed
    pub failed: u64,
    /// Children that ended cancelled
    pub cancelled: u64,
    /// Submissions refused after shutdown
    pub rejected: u64,
    /// Children admitted but not yet finished
    pub active: u64,
}

impl ExecutorStats {
    /// Children that reached a terminal outcome
    pub fn finished(&self) -> u64 {
        self.completed + self.failed + self.cancelled
    }

    /// Share of finished children that failed (0.0 to 1.0)
    pub fn failure_rate(&self) -> f64 {
        let finished = self.finished();
        if finished == 0 {
            return 0.0;
        }
        self.failed as f64 / finished as f64
    }

    /// Get a human-readable status message
    pub fn status_message(&self) -> String {
        format!(
            concat!(
                "Executor: {} active, {} submitted ",
                "({} completed, {} failed, {} cancelled), {} rejected"
            ),
            self.active, self.submitted, self.completed, self.failed, self.cancelled, self.rejected
        )
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_outcome(&self, outcome: Option<TaskOutcome>) {
        let counter = match outcome {
            Some(TaskOutcome::Completed) => &self.completed,
            Some(TaskOutcome::Failed) => &self.failed,
            // A child can only end unsettled if its body panicked.
            Some(TaskOutcome::Cancelled) | None => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ExecutorStats {
        let submitted = self.submitted.load(Ordering::Relaxed);
        let completed = self.completed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let cancelled = self.cancelled.load(Ordering::Relaxed);
        ExecutorStats {
            submitted,
            completed,
            failed,
            cancelled,
            rejected: self.rejected.load(Ordering::Relaxed),
            active: submitted.saturating_sub(completed + failed + cancelled),
        }
    }
}
