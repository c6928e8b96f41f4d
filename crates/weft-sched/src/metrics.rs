//! Cumulative scheduler counters.
//!
//! [`SchedulerMetrics`] is a point-in-time copy of counters the scheduler
//! and its workers bump with relaxed atomics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters since the scheduler was created.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerMetrics {
    /// Tasks accepted by `schedule` (including `combine` barriers).
    pub tasks_scheduled: u64,
    /// Tasks that completed without error.
    pub tasks_succeeded: u64,
    /// Tasks with at least one failed batch.
    pub tasks_failed: u64,
    /// Tasks skipped because a prerequisite failed.
    pub tasks_skipped: u64,
    /// Tasks cancelled by shutdown.
    pub tasks_cancelled: u64,
    /// Batches run, failed or not.
    pub batches_executed: u64,
    /// Batches that panicked or returned an error.
    pub batch_failures: u64,
    /// Aliasing conflicts found by the validator.
    pub data_races_detected: u64,
    /// Scoped buffers reported overdue.
    pub overdue_buffers_reported: u64,
    /// Scheduling boundaries crossed.
    pub cycles: u64,
}

impl SchedulerMetrics {
    /// Tasks that reached Complete by any route.
    pub fn tasks_completed(&self) -> u64 {
        self.tasks_succeeded + self.tasks_failed + self.tasks_skipped + self.tasks_cancelled
    }
}

#[derive(Default)]
pub(crate) struct MetricsCounters {
    pub(crate) tasks_scheduled: AtomicU64,
    pub(crate) tasks_succeeded: AtomicU64,
    pub(crate) tasks_failed: AtomicU64,
    pub(crate) tasks_skipped: AtomicU64,
    pub(crate) tasks_cancelled: AtomicU64,
    pub(crate) batches_executed: AtomicU64,
    pub(crate) batch_failures: AtomicU64,
    pub(crate) data_races_detected: AtomicU64,
    pub(crate) overdue_buffers_reported: AtomicU64,
    pub(crate) cycles: AtomicU64,
}

impl MetricsCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SchedulerMetrics {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        SchedulerMetrics {
            tasks_scheduled: get(&self.tasks_scheduled),
            tasks_succeeded: get(&self.tasks_succeeded),
            tasks_failed: get(&self.tasks_failed),
            tasks_skipped: get(&self.tasks_skipped),
            tasks_cancelled: get(&self.tasks_cancelled),
            batches_executed: get(&self.batches_executed),
            batch_failures: get(&self.batch_failures),
            data_races_detected: get(&self.data_races_detected),
            overdue_buffers_reported: get(&self.overdue_buffers_reported),
            cycles: get(&self.cycles),
        }
    }
}
