//! Per-task shared state: batch cursor, dependency gate, outcome.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

use smallvec::SmallVec;
use weft_buffer::InFlightGuard;
use weft_core::{PayloadFailure, TaskError, TaskId, ViewDescriptors};

use crate::handle::CompletionState;
use crate::pool::PoolShared;
use crate::task::{RunBatch, Task};

/// Lock a mutex, recovering the guard if a panicking thread poisoned it.
///
/// Payloads run under `catch_unwind` and never hold scheduler locks, so
/// the protected data is consistent even after a poison.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct StateCell {
    state: CompletionState,
    outcome: Option<Result<(), TaskError>>,
    dependents: Vec<Arc<TaskRecord>>,
}

/// Everything the scheduler and workers know about one scheduled task.
pub(crate) struct TaskRecord {
    pub(crate) id: TaskId,
    pub(crate) label: String,
    pub(crate) domain: usize,
    pub(crate) batch_width: usize,
    pub(crate) num_batches: usize,
    pub(crate) body: Box<dyn RunBatch>,
    pub(crate) descriptors: ViewDescriptors,
    pub(crate) pool: Weak<PoolShared>,
    /// Next unclaimed batch index.
    pub(crate) next_batch: AtomicUsize,
    /// Batches not yet finished.
    pub(crate) remaining: AtomicUsize,
    /// Unfinished prerequisites plus one guard held by `schedule`.
    pub(crate) pending: AtomicUsize,
    /// Set by whichever path completes the task first.
    finishing: AtomicBool,
    claims: Mutex<Vec<InFlightGuard>>,
    prerequisites: Mutex<SmallVec<[Arc<TaskRecord>; 4]>>,
    failures: Mutex<Vec<PayloadFailure>>,
    upstream: Mutex<Vec<TaskError>>,
    state: Mutex<StateCell>,
    completed: Condvar,
}

impl TaskRecord {
    pub(crate) fn new(
        task: Task,
        batch_width: usize,
        descriptors: ViewDescriptors,
        claims: Vec<InFlightGuard>,
        pool: Weak<PoolShared>,
    ) -> Self {
        let num_batches = task.domain.div_ceil(batch_width);
        Self {
            id: task.id,
            label: task.label,
            domain: task.domain,
            batch_width,
            num_batches,
            body: task.body,
            descriptors,
            pool,
            next_batch: AtomicUsize::new(0),
            remaining: AtomicUsize::new(num_batches),
            pending: AtomicUsize::new(1),
            finishing: AtomicBool::new(false),
            claims: Mutex::new(claims),
            prerequisites: Mutex::new(SmallVec::new()),
            failures: Mutex::new(Vec::new()),
            upstream: Mutex::new(Vec::new()),
            state: Mutex::new(StateCell {
                state: CompletionState::Pending,
                outcome: None,
                dependents: Vec::new(),
            }),
            completed: Condvar::new(),
        }
    }

    /// Gate `self` on `prereq`.
    ///
    /// If the prerequisite already completed, its failure (if any) is
    /// recorded immediately and the gate is not raised.
    pub(crate) fn link_after(self: &Arc<Self>, prereq: &Arc<TaskRecord>) {
        let mut cell = lock(&prereq.state);
        if cell.state == CompletionState::Complete {
            if let Some(Err(e)) = &cell.outcome {
                self.push_upstream(e.clone());
            }
            return;
        }
        self.pending.fetch_add(1, Ordering::AcqRel);
        cell.dependents.push(Arc::clone(self));
        drop(cell);
        lock(&self.prerequisites).push(Arc::clone(prereq));
    }

    /// Drop the gate by one. Returns `true` when it opened.
    pub(crate) fn release_gate(&self) -> bool {
        self.pending.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub(crate) fn push_upstream(&self, err: TaskError) {
        lock(&self.upstream).push(err);
    }

    pub(crate) fn take_upstream(&self) -> Vec<TaskError> {
        std::mem::take(&mut *lock(&self.upstream))
    }

    pub(crate) fn prerequisites(&self) -> SmallVec<[Arc<TaskRecord>; 4]> {
        lock(&self.prerequisites).clone()
    }

    pub(crate) fn record_failure(&self, failure: PayloadFailure) {
        lock(&self.failures).push(failure);
    }

    /// Outcome of a task whose batches have all run.
    pub(crate) fn batch_outcome(&self) -> Result<(), TaskError> {
        let mut failures = std::mem::take(&mut *lock(&self.failures));
        if failures.is_empty() {
            return Ok(());
        }
        failures.sort_by_key(|f| f.batch_index);
        Err(TaskError::PayloadFailed {
            task: self.id,
            label: self.label.clone(),
            failures,
        })
    }

    pub(crate) fn cancelled(&self) -> TaskError {
        TaskError::Cancelled {
            task: self.id,
            label: self.label.clone(),
        }
    }

    /// Move Pending → Running. Returns `false` if the task already completed.
    pub(crate) fn begin_running(&self) -> bool {
        let mut cell = lock(&self.state);
        if cell.state == CompletionState::Complete {
            return false;
        }
        cell.state = CompletionState::Running;
        true
    }

    /// Claim the right to complete the task. Only the first caller gets
    /// `true`.
    pub(crate) fn begin_completion(&self) -> bool {
        !self.finishing.swap(true, Ordering::AcqRel)
    }

    /// End every in-flight buffer claim and forget the prerequisites.
    pub(crate) fn release_resources(&self) {
        lock(&self.claims).clear();
        lock(&self.prerequisites).clear();
    }

    /// Move to Complete, wake waiters, and hand back the dependents.
    ///
    /// Returns `None` if the task had already completed; the first outcome
    /// wins.
    pub(crate) fn mark_complete(
        &self,
        outcome: Result<(), TaskError>,
    ) -> Option<Vec<Arc<TaskRecord>>> {
        let mut cell = lock(&self.state);
        if cell.state == CompletionState::Complete {
            return None;
        }
        cell.state = CompletionState::Complete;
        cell.outcome = Some(outcome);
        let dependents = std::mem::take(&mut cell.dependents);
        drop(cell);
        self.completed.notify_all();
        Some(dependents)
    }

    pub(crate) fn state(&self) -> CompletionState {
        lock(&self.state).state
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.state() == CompletionState::Complete
    }

    /// Block until Complete and return the stored outcome.
    pub(crate) fn wait(&self) -> Result<(), TaskError> {
        let mut cell = lock(&self.state);
        loop {
            if let Some(outcome) = &cell.outcome {
                return outcome.clone();
            }
            cell = self
                .completed
                .wait(cell)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Index range of batch `batch`.
    pub(crate) fn batch_range(&self, batch: usize) -> std::ops::Range<usize> {
        let start = batch * self.batch_width;
        start..start.saturating_add(self.batch_width).min(self.domain)
    }
}
