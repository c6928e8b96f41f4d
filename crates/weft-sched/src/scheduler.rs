//! The user-facing [`Scheduler`] and its shutdown state machine.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use smallvec::SmallVec;
use weft_buffer::{BufferRegistry, InFlightGuard};
use weft_core::{BufferError, CycleId, ScheduleError, TaskError, TaskId};

use crate::config::{ConfigError, Diagnostic, SchedulerConfig};
use crate::handle::TaskHandle;
use crate::metrics::{MetricsCounters, SchedulerMetrics};
use crate::pool::{self, PoolShared};
use crate::record::{lock, TaskRecord};
use crate::task::{ErasedViews, Task};
use crate::validator::{AliasingValidator, LiveTask};

// ── ShutdownReport ─────────────────────────────────────────────────

/// Report from the shutdown state machine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Total time spent in the shutdown sequence.
    pub total_ms: u64,
    /// Time spent waiting for live tasks to finish.
    pub drain_ms: u64,
    /// Time spent stopping and joining workers.
    pub quiesce_ms: u64,
    /// Whether every live task finished within the drain budget.
    pub drained: bool,
    /// Number of worker threads joined.
    pub workers_joined: usize,
    /// Tasks cancelled because they had not started.
    pub tasks_cancelled: u64,
}

// ── ShutdownState ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownState {
    Running,
    Draining,
    Quiescing,
    Dropped,
}

// ── Scheduler ──────────────────────────────────────────────────────

/// A fixed pool of worker threads plus the registries of live buffers and
/// live tasks.
///
/// `schedule` never blocks and never runs payloads on the calling thread.
/// The scheduler is `Sync`: several threads may schedule concurrently.
pub struct Scheduler {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
    registry: BufferRegistry,
    validator: AliasingValidator,
    config: SchedulerConfig,
    state: ShutdownState,
}

impl Scheduler {
    /// Validate `config` and spawn the worker pool.
    pub fn new(config: SchedulerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let worker_count = config.resolved_worker_count();
        let (shared, receiver) = PoolShared::new(worker_count);
        let workers = pool::spawn_workers(worker_count, &receiver, &shared)?;
        tracing::debug!(workers = worker_count, diagnostics = ?config.diagnostics, "scheduler started");
        Ok(Self {
            shared,
            workers,
            registry: BufferRegistry::new(config.registry.clone()),
            validator: AliasingValidator::new(config.diagnostics.aliasing),
            config,
            state: ShutdownState::Running,
        })
    }

    /// The registry buffers for this scheduler are created from.
    pub fn registry(&self) -> &BufferRegistry {
        &self.registry
    }

    /// The configuration the scheduler was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.shared.workers()
    }

    /// Number of scheduled tasks that have not completed.
    pub fn live_tasks(&self) -> usize {
        lock(&self.shared.live).len()
    }

    /// Cumulative counters.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.shared.metrics.snapshot()
    }

    /// Schedule `task` after every handle in `prerequisites`.
    ///
    /// The domain is split into `ceil(domain / batch_width)` contiguous
    /// batches. No batch starts before every prerequisite is Complete.
    ///
    /// # Errors
    ///
    /// - [`ScheduleError::InvalidBatchWidth`] if `batch_width == 0`.
    /// - [`ScheduleError::SelfDependency`] if a prerequisite is the task.
    /// - [`ScheduleError::Buffer`] if a view's buffer was released.
    /// - [`ScheduleError::DataRace`] if the aliasing policy is `Deny` and a
    ///   view conflicts with a concurrently runnable task.
    /// - [`ScheduleError::ShuttingDown`] after `shutdown`.
    pub fn schedule(
        &self,
        task: Task,
        batch_width: usize,
        prerequisites: &[TaskHandle],
    ) -> Result<TaskHandle, ScheduleError> {
        if self.state != ShutdownState::Running {
            return Err(ScheduleError::ShuttingDown);
        }
        if batch_width == 0 {
            return Err(ScheduleError::InvalidBatchWidth);
        }
        let mut prereqs: SmallVec<[Arc<TaskRecord>; 4]> = SmallVec::new();
        for handle in prerequisites {
            if handle.id() == task.id {
                return Err(ScheduleError::SelfDependency { task: task.id });
            }
            if !prereqs.iter().any(|p| p.id == handle.id()) {
                prereqs.push(Arc::clone(&handle.record));
            }
        }
        if let Some(dead) = task.views.iter().find(|v| !v.buffer.is_live()) {
            return Err(BufferError::UseAfterRelease {
                buffer: dead.descriptor.buffer,
            }
            .into());
        }
        let descriptors = task.descriptors();

        let mut live = lock(&self.shared.live);
        if self.validator.policy().is_enabled() {
            let ancestors = ancestors(&prereqs);
            let new = LiveTask {
                id: task.id,
                label: &task.label,
                views: &descriptors,
            };
            let others = live
                .values()
                .filter(|r| !ancestors.contains(&r.id) && !r.is_complete())
                .map(|r| LiveTask {
                    id: r.id,
                    label: &r.label,
                    views: &r.descriptors,
                });
            match self.validator.check(new, others) {
                Ok(None) => {}
                Ok(Some(_)) => MetricsCounters::bump(&self.shared.metrics.data_races_detected),
                Err(e) => {
                    MetricsCounters::bump(&self.shared.metrics.data_races_detected);
                    return Err(e);
                }
            }
        }
        let claims = claim_buffers(&task.views)?;

        let record = Arc::new(TaskRecord::new(
            task,
            batch_width,
            descriptors,
            claims,
            Arc::downgrade(&self.shared),
        ));
        for prereq in &prereqs {
            record.link_after(prereq);
        }
        live.insert(record.id, Arc::clone(&record));
        drop(live);

        MetricsCounters::bump(&self.shared.metrics.tasks_scheduled);
        tracing::trace!(
            task = %record.id,
            label = %record.label,
            domain = record.domain,
            batches = record.num_batches,
            prerequisites = prereqs.len(),
            "scheduled"
        );

        if record.release_gate() {
            if let Some((done, outcome)) = pool::dispatch(Arc::clone(&record)) {
                pool::complete(done, outcome);
            }
        }
        Ok(TaskHandle::new(record))
    }

    /// A handle that completes once every handle in `handles` has.
    ///
    /// Fails if any input failed, with the input failures as upstream.
    pub fn combine(&self, handles: &[TaskHandle]) -> Result<TaskHandle, ScheduleError> {
        self.schedule(Task::barrier("combine"), 1, handles)
    }

    /// Block on every handle; return the first failure in argument order.
    pub fn complete_all(&self, handles: &[TaskHandle]) -> Result<(), TaskError> {
        let mut first = None;
        for handle in handles {
            if let Err(e) = handle.complete() {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Cross a scheduling boundary.
    ///
    /// Advances the registry's cycle and reports scoped buffers that
    /// outlived their budget, per the `scoped_overdue` policy. The cycle
    /// advances even when an overdue buffer is reported as an error.
    pub fn begin_cycle(&self) -> Result<CycleId, ScheduleError> {
        if self.state != ShutdownState::Running {
            return Err(ScheduleError::ShuttingDown);
        }
        let (cycle, overdue) = self.registry.advance_cycle();
        MetricsCounters::bump(&self.shared.metrics.cycles);
        let policy = self.config.diagnostics.scoped_overdue;
        if !policy.is_enabled() {
            return Ok(cycle);
        }
        for buffer in &overdue {
            MetricsCounters::bump(&self.shared.metrics.overdue_buffers_reported);
            tracing::warn!(
                buffer = %buffer.id,
                element_type = buffer.element_type,
                bytes = buffer.byte_len,
                allocated = %buffer.allocated,
                max_cycles_alive = buffer.max_cycles_alive,
                %cycle,
                "scoped buffer overdue"
            );
        }
        match overdue.first() {
            Some(first) if policy == Diagnostic::Deny => Err(ScheduleError::ScopedBufferOverdue {
                buffer: first.id,
                allocated: first.allocated,
                max_cycles_alive: first.max_cycles_alive,
                current: cycle,
            }),
            _ => Ok(cycle),
        }
    }

    /// Shut down with the 3-phase state machine.
    ///
    /// 1. **Running → Draining:** refuse new work and wait up to
    ///    `shutdown_timeout_ms` for live tasks to finish.
    /// 2. **Draining → Quiescing:** stop dispatching newly ready tasks, let
    ///    workers finish the tasks they started, and join them.
    /// 3. **Quiescing → Dropped:** cancel every task that never started.
    ///
    /// Idempotent; `Drop` calls it.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.state == ShutdownState::Dropped {
            return ShutdownReport {
                drained: true,
                ..ShutdownReport::default()
            };
        }
        let start = Instant::now();
        let cancelled_before = self.shared.metrics.snapshot().tasks_cancelled;

        // Phase 1: Running → Draining
        self.state = ShutdownState::Draining;
        let drained = self
            .shared
            .wait_drained(Duration::from_millis(self.config.shutdown_timeout_ms));
        let drain_ms = start.elapsed().as_millis() as u64;

        // Phase 2: Draining → Quiescing
        self.state = ShutdownState::Quiescing;
        self.shared.begin_stopping();
        self.shared.send_shutdown(self.workers.len());
        let mut workers_joined = 0;
        for handle in self.workers.drain(..) {
            if handle.join().is_ok() {
                workers_joined += 1;
            }
        }
        let quiesce_ms = (start.elapsed().as_millis() as u64).saturating_sub(drain_ms);

        // Phase 3: Quiescing → Dropped
        self.state = ShutdownState::Dropped;
        self.shared.cancel_leftovers();
        let tasks_cancelled = self.shared.metrics.snapshot().tasks_cancelled - cancelled_before;

        let report = ShutdownReport {
            total_ms: start.elapsed().as_millis() as u64,
            drain_ms,
            quiesce_ms,
            drained,
            workers_joined,
            tasks_cancelled,
        };
        tracing::debug!(?report, "scheduler stopped");
        report
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.state != ShutdownState::Dropped {
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("workers", &self.shared.workers())
            .field("state", &self.state)
            .field("live_tasks", &self.live_tasks())
            .finish()
    }
}

const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Scheduler>();
};

/// Every task reachable through prerequisite links that has not completed.
fn ancestors(prereqs: &[Arc<TaskRecord>]) -> HashSet<TaskId> {
    let mut seen = HashSet::new();
    let mut stack: Vec<Arc<TaskRecord>> = prereqs.to_vec();
    while let Some(record) = stack.pop() {
        if seen.insert(record.id) {
            stack.extend(record.prerequisites());
        }
    }
    seen
}

/// One in-flight claim per distinct buffer, writing if any view writes.
fn claim_buffers(views: &ErasedViews) -> Result<Vec<InFlightGuard>, BufferError> {
    let mut distinct: SmallVec<[(usize, bool); 4]> = SmallVec::new();
    for (i, view) in views.iter().enumerate() {
        let writes = view.descriptor.mode.can_write();
        match distinct
            .iter_mut()
            .find(|(j, _)| views[*j].descriptor.buffer == view.descriptor.buffer)
        {
            Some((_, w)) => *w |= writes,
            None => distinct.push((i, writes)),
        }
    }
    distinct
        .into_iter()
        .map(|(i, writes)| views[i].buffer.acquire(writes))
        .collect()
}
