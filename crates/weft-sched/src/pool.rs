//! Worker threads, batch execution, and the completion protocol.
//!
//! Each worker receives [`WorkerMsg::Run`] tickets via a crossbeam channel.
//! A ticket names a task, not a batch: the worker claims batches from the
//! task's atomic cursor until none remain, so one task costs at most one
//! message per worker regardless of its batch count.
//!
//! The worker that finishes a task's last batch completes it: releases its
//! buffer claims, retires it from the live registry, stores the outcome and
//! wakes waiters, and dispatches every dependent whose gate opened. That
//! last step runs as a work list so long chains never recurse.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use indexmap::IndexMap;
use weft_core::{PayloadFailure, TaskError, TaskId};

use crate::config::ConfigError;
use crate::metrics::MetricsCounters;
use crate::record::{lock, TaskRecord};

/// A message to a worker thread.
pub(crate) enum WorkerMsg {
    /// Help run this task's batches.
    Run(Arc<TaskRecord>),
    /// Exit the loop.
    Shutdown,
}

/// State shared by the scheduler front end and every worker.
pub(crate) struct PoolShared {
    sender: Sender<WorkerMsg>,
    workers: usize,
    /// Scheduled tasks that have not completed, in scheduling order.
    pub(crate) live: Mutex<IndexMap<TaskId, Arc<TaskRecord>>>,
    drained: Condvar,
    stopping: AtomicBool,
    pub(crate) metrics: MetricsCounters,
}

impl PoolShared {
    pub(crate) fn new(workers: usize) -> (Arc<Self>, Receiver<WorkerMsg>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let shared = Arc::new(Self {
            sender,
            workers,
            live: Mutex::new(IndexMap::new()),
            drained: Condvar::new(),
            stopping: AtomicBool::new(false),
            metrics: MetricsCounters::default(),
        });
        (shared, receiver)
    }

    pub(crate) fn workers(&self) -> usize {
        self.workers
    }

    /// From now on, tasks whose gate opens are cancelled instead of run.
    pub(crate) fn begin_stopping(&self) {
        self.stopping.store(true, Ordering::Release);
    }

    /// Ask `count` workers to exit once the tickets ahead of them are done.
    pub(crate) fn send_shutdown(&self, count: usize) {
        for _ in 0..count {
            let _ = self.sender.send(WorkerMsg::Shutdown);
        }
    }

    /// Wait until no task is live. Returns `false` on timeout.
    pub(crate) fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut live = lock(&self.live);
        while !live.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            live = match self.drained.wait_timeout(live, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    fn retire(&self, record: &TaskRecord, outcome: &Result<(), TaskError>) {
        {
            let mut live = lock(&self.live);
            live.shift_remove(&record.id);
            if live.is_empty() {
                self.drained.notify_all();
            }
        }
        let counter = match outcome {
            Ok(()) => &self.metrics.tasks_succeeded,
            Err(TaskError::PayloadFailed { .. }) => &self.metrics.tasks_failed,
            Err(TaskError::PrerequisiteFailed { .. }) => &self.metrics.tasks_skipped,
            Err(TaskError::Cancelled { .. }) => &self.metrics.tasks_cancelled,
        };
        MetricsCounters::bump(counter);
    }

    /// Cancel every task still live. Only called once workers are joined.
    pub(crate) fn cancel_leftovers(&self) {
        let leftovers: Vec<_> = lock(&self.live).values().cloned().collect();
        for record in leftovers {
            let err = record.cancelled();
            complete(record, Err(err));
        }
    }
}

// ── Workers ────────────────────────────────────────────────────────

/// Spawn `count` named workers. On failure the already-spawned workers are
/// stopped and joined before the error is returned.
pub(crate) fn spawn_workers(
    count: usize,
    receiver: &Receiver<WorkerMsg>,
    shared: &Arc<PoolShared>,
) -> Result<Vec<JoinHandle<()>>, ConfigError> {
    let mut handles = Vec::with_capacity(count);
    for i in 0..count {
        let rx = receiver.clone();
        let pool = Arc::clone(shared);
        let name = format!("weft-worker-{i}");
        match thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(rx, pool))
        {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                shared.send_shutdown(handles.len());
                for handle in handles {
                    let _ = handle.join();
                }
                return Err(ConfigError::ThreadSpawnFailed {
                    reason: format!("{name}: {e}"),
                });
            }
        }
    }
    Ok(handles)
}

/// Main loop for a worker thread. Runs until it receives
/// [`WorkerMsg::Shutdown`] or the channel closes.
fn worker_loop(receiver: Receiver<WorkerMsg>, shared: Arc<PoolShared>) {
    tracing::trace!("worker started");
    while let Ok(msg) = receiver.recv() {
        match msg {
            WorkerMsg::Run(record) => run_batches(&shared, &record),
            WorkerMsg::Shutdown => break,
        }
    }
    tracing::trace!("worker stopped");
}

/// Claim and run batches of `record` until none are left.
fn run_batches(shared: &PoolShared, record: &Arc<TaskRecord>) {
    loop {
        let batch = record.next_batch.fetch_add(1, Ordering::Relaxed);
        if batch >= record.num_batches {
            return;
        }
        run_batch(shared, record, batch);
        if record.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let outcome = record.batch_outcome();
            if let Err(e) = &outcome {
                tracing::debug!(task = %record.id, label = %record.label, error = %e, "task failed");
            }
            complete(Arc::clone(record), outcome);
        }
    }
}

fn run_batch(shared: &PoolShared, record: &TaskRecord, batch: usize) {
    let range = record.batch_range(batch);
    let at = Cell::new(range.start);
    let result = panic::catch_unwind(AssertUnwindSafe(|| record.body.run(range.clone(), &at)));
    MetricsCounters::bump(&shared.metrics.batches_executed);
    let message = match result {
        Ok(Ok(())) => return,
        Ok(Err(message)) => message,
        Err(payload) => panic_message(payload.as_ref()),
    };
    MetricsCounters::bump(&shared.metrics.batch_failures);
    record.record_failure(PayloadFailure {
        task: record.id,
        label: record.label.clone(),
        batch_index: batch,
        range,
        index: at.get(),
        message,
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

// ── Completion protocol ────────────────────────────────────────────

/// Start a task whose gate just opened.
///
/// Returns the task with its final outcome when it completes without
/// running any batch: cancelled, skipped after a failed prerequisite, or an
/// empty domain. Otherwise hands tickets to the workers and returns `None`.
pub(crate) fn dispatch(record: Arc<TaskRecord>) -> Option<(Arc<TaskRecord>, Result<(), TaskError>)> {
    let Some(pool) = record.pool.upgrade() else {
        let err = record.cancelled();
        return Some((record, Err(err)));
    };
    if pool.stopping.load(Ordering::Acquire) {
        let err = record.cancelled();
        return Some((record, Err(err)));
    }
    let upstream = record.take_upstream();
    if !upstream.is_empty() {
        let err = TaskError::PrerequisiteFailed {
            task: record.id,
            label: record.label.clone(),
            upstream,
        };
        return Some((record, Err(err)));
    }
    if record.num_batches == 0 {
        return Some((record, Ok(())));
    }
    if !record.begin_running() {
        return None;
    }
    let tickets = record.num_batches.min(pool.workers);
    tracing::trace!(task = %record.id, label = %record.label, batches = record.num_batches, tickets, "dispatch");
    for _ in 0..tickets {
        // Receivers live as long as the workers; a closed channel means the
        // pool is gone and shutdown's sweep will cancel the task.
        if pool.sender.send(WorkerMsg::Run(Arc::clone(&record))).is_err() {
            break;
        }
    }
    None
}

/// Complete `record` with `outcome`, then every dependent that becomes
/// ready without running, iteratively.
pub(crate) fn complete(record: Arc<TaskRecord>, outcome: Result<(), TaskError>) {
    let mut work = vec![(record, outcome)];
    while let Some((record, outcome)) = work.pop() {
        if !record.begin_completion() {
            continue;
        }
        record.release_resources();
        if let Some(pool) = record.pool.upgrade() {
            pool.retire(&record, &outcome);
        }
        let Some(dependents) = record.mark_complete(outcome.clone()) else {
            continue;
        };
        for dependent in dependents {
            if let Err(e) = &outcome {
                dependent.push_upstream(e.clone());
            }
            if dependent.release_gate() {
                if let Some(done) = dispatch(dependent) {
                    work.push(done);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_messages_are_extracted() {
        let err = panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "static message");
        let err = panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "formatted 7");
        let err = panic::catch_unwind(|| std::panic::panic_any(42u32)).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "panic with a non-string payload");
    }

    #[test]
    fn workers_exit_on_shutdown() {
        let (shared, rx) = PoolShared::new(3);
        let handles = spawn_workers(3, &rx, &shared).unwrap();
        shared.send_shutdown(3);
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn drained_when_nothing_is_live() {
        let (shared, _rx) = PoolShared::new(1);
        assert!(shared.wait_drained(Duration::from_millis(1)));
    }
}
