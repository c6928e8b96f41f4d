//! Aliasing checks run at schedule time.
//!
//! Two tasks may run concurrently unless one is an ancestor of the other.
//! The validator compares a new task's view footprints against every live
//! task that is not one of its ancestors, and against each other.

use weft_buffer::conflicts;
use weft_core::{DataRaceReport, ScheduleError, TaskId, ViewDescriptor};

use crate::config::Diagnostic;

/// A scheduled task as the validator sees it.
#[derive(Clone, Copy, Debug)]
pub struct LiveTask<'a> {
    /// The task's id.
    pub id: TaskId,
    /// The task's label.
    pub label: &'a str,
    /// The task's view footprints.
    pub views: &'a [ViewDescriptor],
}

/// Detects conflicting views between tasks allowed to run concurrently.
#[derive(Clone, Copy, Debug)]
pub struct AliasingValidator {
    policy: Diagnostic,
}

impl AliasingValidator {
    /// A validator applying `policy`.
    pub fn new(policy: Diagnostic) -> Self {
        Self { policy }
    }

    /// The configured policy.
    pub fn policy(&self) -> Diagnostic {
        self.policy
    }

    /// Two views of `task` that both permit mutation and overlap.
    pub fn find_internal_conflict(task: LiveTask<'_>) -> Option<DataRaceReport> {
        for (i, a) in task.views.iter().enumerate() {
            for b in &task.views[i + 1..] {
                if a.mode.can_write() && b.mode.can_write() && conflicts(a, b) {
                    return Some(report(task, a, task, b));
                }
            }
        }
        None
    }

    /// The first view of `task` that conflicts with a view of a task in
    /// `others`. Callers exclude completed tasks and ancestors.
    pub fn find_conflict<'a>(
        task: LiveTask<'_>,
        others: impl IntoIterator<Item = LiveTask<'a>>,
    ) -> Option<DataRaceReport> {
        for other in others {
            for existing in other.views {
                for new in task.views {
                    if conflicts(new, existing) {
                        return Some(report(task, new, other, existing));
                    }
                }
            }
        }
        None
    }

    /// Run both checks under the configured policy.
    ///
    /// `Off` skips the scan. `Warn` logs the conflict and returns it as
    /// `Ok(Some(_))`. `Deny` returns [`ScheduleError::DataRace`].
    pub fn check<'a>(
        &self,
        task: LiveTask<'_>,
        others: impl IntoIterator<Item = LiveTask<'a>>,
    ) -> Result<Option<DataRaceReport>, ScheduleError> {
        if !self.policy.is_enabled() {
            return Ok(None);
        }
        let found =
            Self::find_internal_conflict(task).or_else(|| Self::find_conflict(task, others));
        match (found, self.policy) {
            (None, _) => Ok(None),
            (Some(report), Diagnostic::Deny) => Err(ScheduleError::DataRace(Box::new(report))),
            (Some(report), _) => {
                tracing::warn!(%report, "aliasing conflict");
                Ok(Some(report))
            }
        }
    }
}

fn report(
    new_task: LiveTask<'_>,
    new_view: &ViewDescriptor,
    existing_task: LiveTask<'_>,
    existing_view: &ViewDescriptor,
) -> DataRaceReport {
    DataRaceReport {
        buffer: new_view.buffer,
        new_task: new_task.id,
        new_label: new_task.label.to_string(),
        new_view: *new_view,
        existing_task: existing_task.id,
        existing_label: existing_task.label.to_string(),
        existing_view: *existing_view,
    }
}
