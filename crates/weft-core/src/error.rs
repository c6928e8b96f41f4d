//! Error types for the Weft job scheduler.
//!
//! Organized by subsystem: buffer allocation and views, scheduling, and task
//! completion. Buffer and schedule errors surface synchronously at the call
//! that caused them; task errors are captured on worker threads and surface
//! at `complete()`.

use std::error::Error;
use std::fmt;
use std::ops::Range;

use crate::id::{BufferId, CycleId, TaskId};
use crate::view::ViewDescriptor;

/// Errors from buffer allocation, view construction, release, and copies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BufferError {
    /// Zero-length request, size overflow, registry capacity exhausted, or
    /// the system allocator refused.
    AllocationFailed {
        /// Bytes requested (saturated on overflow).
        requested_bytes: usize,
        /// Human-readable cause.
        reason: String,
    },
    /// `byte_offset + stride*(count-1) + element_size` exceeds the buffer.
    OutOfBounds {
        /// The buffer the view was requested on.
        buffer: BufferId,
        /// Requested byte offset.
        byte_offset: usize,
        /// Requested stride in bytes.
        stride: usize,
        /// Requested element count.
        count: usize,
        /// Size of the viewed element type.
        element_size: usize,
        /// Total size of the buffer in bytes.
        buffer_bytes: usize,
    },
    /// A multi-element view whose stride is smaller than its element, so
    /// consecutive elements would overlap.
    InvalidStride {
        /// The buffer the view was requested on.
        buffer: BufferId,
        /// Requested stride in bytes.
        stride: usize,
        /// Size of the viewed element type.
        element_size: usize,
    },
    /// The buffer has already been released.
    UseAfterRelease {
        /// The released buffer.
        buffer: BufferId,
    },
    /// Tasks referencing the buffer have not completed yet.
    BufferInUse {
        /// The busy buffer.
        buffer: BufferId,
        /// Outstanding tasks that only read the buffer.
        readers: usize,
        /// Outstanding tasks that may write the buffer.
        writers: usize,
    },
    /// A copy-in or copy-out slice does not match the buffer length.
    LengthMismatch {
        /// The buffer being copied.
        buffer: BufferId,
        /// Buffer length in elements.
        expected: usize,
        /// Slice length in elements.
        actual: usize,
    },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailed {
                requested_bytes,
                reason,
            } => write!(
                f,
                "allocation of {requested_bytes} bytes failed: {reason}"
            ),
            Self::OutOfBounds {
                buffer,
                byte_offset,
                stride,
                count,
                element_size,
                buffer_bytes,
            } => write!(
                f,
                "view out of bounds on {buffer}: offset {byte_offset}, stride {stride}, \
                 count {count}, element {element_size}B exceeds {buffer_bytes}B"
            ),
            Self::InvalidStride {
                buffer,
                stride,
                element_size,
            } => write!(
                f,
                "stride {stride} on {buffer} is smaller than element size {element_size}"
            ),
            Self::UseAfterRelease { buffer } => write!(f, "{buffer} has been released"),
            Self::BufferInUse {
                buffer,
                readers,
                writers,
            } => write!(
                f,
                "{buffer} is in use by {readers} reading and {writers} writing task(s)"
            ),
            Self::LengthMismatch {
                buffer,
                expected,
                actual,
            } => write!(
                f,
                "copy length mismatch on {buffer}: buffer holds {expected}, slice holds {actual}"
            ),
        }
    }
}

impl Error for BufferError {}

/// Two views that may touch the same bytes from tasks allowed to run at
/// the same time, at least one of them mutably.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataRaceReport {
    /// The contested buffer.
    pub buffer: BufferId,
    /// The task being scheduled.
    pub new_task: TaskId,
    /// Label of the task being scheduled.
    pub new_label: String,
    /// The offending view of the task being scheduled.
    pub new_view: ViewDescriptor,
    /// The already-scheduled task (equal to `new_task` for a conflict
    /// inside one task).
    pub existing_task: TaskId,
    /// Label of the already-scheduled task.
    pub existing_label: String,
    /// The already-scheduled view.
    pub existing_view: ViewDescriptor,
}

impl fmt::Display for DataRaceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "data race on {}: '{}' ({}) view {} overlaps '{}' ({}) view {}",
            self.buffer,
            self.new_label,
            self.new_task,
            self.new_view,
            self.existing_label,
            self.existing_task,
            self.existing_view
        )
    }
}

/// Errors from `Scheduler::schedule` and the scheduling boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    /// `batch_width` was zero.
    InvalidBatchWidth,
    /// A task was given its own handle as a prerequisite.
    SelfDependency {
        /// The offending task.
        task: TaskId,
    },
    /// The aliasing validator found conflicting views.
    DataRace(Box<DataRaceReport>),
    /// A scoped buffer outlived its cycle budget.
    ScopedBufferOverdue {
        /// The overdue buffer.
        buffer: BufferId,
        /// Cycle the buffer was allocated in.
        allocated: CycleId,
        /// Its declared budget.
        max_cycles_alive: u32,
        /// The boundary at which it was found overdue.
        current: CycleId,
    },
    /// A view references a buffer that cannot be used.
    Buffer(BufferError),
    /// The scheduler has shut down.
    ShuttingDown,
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBatchWidth => write!(f, "batch width must be at least 1"),
            Self::SelfDependency { task } => write!(f, "{task} lists itself as a prerequisite"),
            Self::DataRace(report) => write!(f, "{report}"),
            Self::ScopedBufferOverdue {
                buffer,
                allocated,
                max_cycles_alive,
                current,
            } => write!(
                f,
                "scoped {buffer} allocated at cycle {allocated} with a budget of \
                 {max_cycles_alive} cycle(s) is still alive at cycle {current}"
            ),
            Self::Buffer(e) => write!(f, "buffer: {e}"),
            Self::ShuttingDown => write!(f, "scheduler is shutting down"),
        }
    }
}

impl Error for ScheduleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Buffer(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BufferError> for ScheduleError {
    fn from(e: BufferError) -> Self {
        Self::Buffer(e)
    }
}

/// One failed batch: a panic or an `Err` returned by a payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayloadFailure {
    /// Owning task.
    pub task: TaskId,
    /// Owning task's label.
    pub label: String,
    /// Which batch failed.
    pub batch_index: usize,
    /// The batch's index range.
    pub range: Range<usize>,
    /// The index being processed when the payload failed.
    pub index: usize,
    /// Panic message or returned error.
    pub message: String,
}

impl fmt::Display for PayloadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' ({}) batch {} [{}..{}) failed at index {}: {}",
            self.label,
            self.task,
            self.batch_index,
            self.range.start,
            self.range.end,
            self.index,
            self.message
        )
    }
}

impl Error for PayloadFailure {}

/// Outcome of a task that did not finish cleanly, reported by `complete()`.
///
/// Stored on the task once it reaches Complete; every later `complete()`
/// call returns a clone of the same value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskError {
    /// One or more batches failed. The other batches still ran.
    PayloadFailed {
        /// The failed task.
        task: TaskId,
        /// Its label.
        label: String,
        /// Every failed batch, ordered by batch index.
        failures: Vec<PayloadFailure>,
    },
    /// A prerequisite failed, so this task's payload never ran.
    PrerequisiteFailed {
        /// The skipped task.
        task: TaskId,
        /// Its label.
        label: String,
        /// Errors of the failed prerequisites.
        upstream: Vec<TaskError>,
    },
    /// The scheduler shut down before the task started.
    Cancelled {
        /// The cancelled task.
        task: TaskId,
        /// Its label.
        label: String,
    },
}

impl TaskError {
    /// The task this error is reported on.
    pub fn task(&self) -> TaskId {
        match self {
            Self::PayloadFailed { task, .. }
            | Self::PrerequisiteFailed { task, .. }
            | Self::Cancelled { task, .. } => *task,
        }
    }

    /// Label of the task this error is reported on.
    pub fn label(&self) -> &str {
        match self {
            Self::PayloadFailed { label, .. }
            | Self::PrerequisiteFailed { label, .. }
            | Self::Cancelled { label, .. } => label,
        }
    }

    /// Every payload failure at the root of this error, walking upstream.
    pub fn root_failures(&self) -> Vec<&PayloadFailure> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(err) = stack.pop() {
            match err {
                Self::PayloadFailed { failures, .. } => out.extend(failures.iter()),
                Self::PrerequisiteFailed { upstream, .. } => stack.extend(upstream.iter().rev()),
                Self::Cancelled { .. } => {}
            }
        }
        out
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadFailed {
                task,
                label,
                failures,
            } => {
                write!(f, "'{label}' ({task}) failed in {} batch(es)", failures.len())?;
                if let Some(first) = failures.first() {
                    write!(f, ": {first}")?;
                }
                Ok(())
            }
            Self::PrerequisiteFailed {
                task,
                label,
                upstream,
            } => {
                write!(f, "'{label}' ({task}) skipped: prerequisite failed")?;
                for e in upstream {
                    write!(f, "; {e}")?;
                }
                Ok(())
            }
            Self::Cancelled { task, label } => {
                write!(f, "'{label}' ({task}) cancelled by scheduler shutdown")
            }
        }
    }
}

impl Error for TaskError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::PayloadFailed { failures, .. } => {
                failures.first().map(|f| f as &(dyn Error + 'static))
            }
            Self::PrerequisiteFailed { upstream, .. } => {
                upstream.first().map(|e| e as &(dyn Error + 'static))
            }
            Self::Cancelled { .. } => None,
        }
    }
}
