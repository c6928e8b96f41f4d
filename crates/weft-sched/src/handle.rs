//! Handles to scheduled tasks.

use std::fmt;
use std::sync::Arc;

use weft_core::{TaskError, TaskId};

use crate::record::TaskRecord;

/// Lifecycle of a scheduled task. Moves forward only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompletionState {
    /// Waiting on prerequisites.
    Pending,
    /// Batches have been handed to workers.
    Running,
    /// Every batch finished, or the task was skipped or cancelled.
    Complete,
}

impl fmt::Display for CompletionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Token for a scheduled task.
///
/// Cloning is one reference-count increment. Pass handles as
/// prerequisites to chain tasks, and call [`complete`](Self::complete)
/// before reading anything the task wrote.
#[derive(Clone)]
pub struct TaskHandle {
    pub(crate) record: Arc<TaskRecord>,
}

impl TaskHandle {
    pub(crate) fn new(record: Arc<TaskRecord>) -> Self {
        Self { record }
    }

    /// The task's id.
    pub fn id(&self) -> TaskId {
        self.record.id
    }

    /// The task's label.
    pub fn label(&self) -> &str {
        &self.record.label
    }

    /// Number of batches the domain was split into.
    pub fn batch_count(&self) -> usize {
        self.record.num_batches
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CompletionState {
        self.record.state()
    }

    /// Non-blocking poll.
    pub fn is_completed(&self) -> bool {
        self.record.is_complete()
    }

    /// Block until the task (and so every transitive prerequisite) is
    /// Complete.
    ///
    /// Returns the task's failure, if any; repeated calls return the same
    /// outcome. Must not be called from inside a payload.
    pub fn complete(&self) -> Result<(), TaskError> {
        self.record.wait()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.record.id)
            .field("label", &self.record.label)
            .field("state", &self.record.state())
            .finish()
    }
}

const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<TaskHandle>();
};
