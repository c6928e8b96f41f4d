//! Benchmark profiles for the Weft job scheduler.
//!
//! - [`bench_scheduler`]: a scheduler with diagnostics off, so the numbers
//!   measure dispatch and not validation.
//! - [`saxpy_task`]: a memory-bound parallel-for used by the batch-width
//!   sweep.
//! - [`schedule_chain`]: `depth` dependent single tasks.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use weft_buffer::Buffer;
use weft_core::{AccessMode, BufferError, ScheduleError};
use weft_sched::{DiagnosticsConfig, Scheduler, SchedulerConfig, Task, TaskHandle};

/// Elements in the reference buffers.
pub const REFERENCE_LEN: usize = 100_000;

/// A scheduler with `workers` threads and every diagnostic off.
pub fn bench_scheduler(workers: usize) -> Scheduler {
    let config = SchedulerConfig {
        diagnostics: DiagnosticsConfig::off(),
        ..SchedulerConfig::with_workers(workers)
    };
    Scheduler::new(config).expect("benchmark scheduler config is valid")
}

/// `y[i] = a * x[i] + y[i]`.
pub fn saxpy_task(a: f32, x: &Buffer<f32>, y: &Buffer<f32>) -> Result<Task, BufferError> {
    let views = (
        x.view_all(AccessMode::ReadOnly)?,
        y.view_all(AccessMode::ReadWrite)?,
    );
    Ok(Task::parallel_for("saxpy", x.len(), views, move |i, (x, y)| {
        let xi = x.get(i);
        y.update(i, |yi| a * xi + yi);
    }))
}

/// Schedule `depth` view-less single tasks, each after the previous one.
/// Returns the last handle.
pub fn schedule_chain(scheduler: &Scheduler, depth: usize) -> Result<Option<TaskHandle>, ScheduleError> {
    let mut last: Option<TaskHandle> = None;
    for _ in 0..depth {
        let prerequisites: Vec<TaskHandle> = last.iter().cloned().collect();
        last = Some(scheduler.schedule(Task::single("link", (), |_| {}), 1, &prerequisites)?);
    }
    Ok(last)
}
