//! Caller-held dependency chains.

use weft_core::{ScheduleError, TaskError};

use crate::handle::TaskHandle;
use crate::scheduler::Scheduler;
use crate::task::Task;

/// The most recent handle of a sequence of dependent tasks.
///
/// Each [`schedule`](Self::schedule) runs after the previous one and
/// replaces the slot. Typical use is one chain per object that re-issues
/// its stages every cycle:
///
/// ```no_run
/// # use weft_sched::{Chain, Scheduler, SchedulerConfig, Task};
/// # let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
/// let mut chain = Chain::new();
/// chain.schedule(&scheduler, Task::single("first", (), |_| {}), 1).unwrap();
/// chain.schedule(&scheduler, Task::single("second", (), |_| {}), 1).unwrap();
/// chain.complete().unwrap();
/// ```
#[derive(Clone, Debug, Default)]
pub struct Chain {
    last: Option<TaskHandle>,
}

impl Chain {
    /// An empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` after the chain's last task.
    pub fn schedule(
        &mut self,
        scheduler: &Scheduler,
        task: Task,
        batch_width: usize,
    ) -> Result<TaskHandle, ScheduleError> {
        self.schedule_after(scheduler, task, batch_width, &[])
    }

    /// Schedule `task` after the chain's last task and every handle in
    /// `extra`; used to join another chain into this one.
    pub fn schedule_after(
        &mut self,
        scheduler: &Scheduler,
        task: Task,
        batch_width: usize,
        extra: &[TaskHandle],
    ) -> Result<TaskHandle, ScheduleError> {
        let mut prerequisites: Vec<TaskHandle> = self.last.iter().cloned().collect();
        prerequisites.extend_from_slice(extra);
        let handle = scheduler.schedule(task, batch_width, &prerequisites)?;
        self.last = Some(handle.clone());
        Ok(handle)
    }

    /// Block on the last task and clear the slot. An empty chain is
    /// already complete.
    pub fn complete(&mut self) -> Result<(), TaskError> {
        match self.last.take() {
            Some(handle) => handle.complete(),
            None => Ok(()),
        }
    }

    /// The last scheduled handle, for fan-out.
    pub fn handle(&self) -> Option<&TaskHandle> {
        self.last.as_ref()
    }

    /// Whether nothing has been scheduled since the last `complete`.
    pub fn is_empty(&self) -> bool {
        self.last.is_none()
    }
}
