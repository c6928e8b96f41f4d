//! Weft: a parallel-for job scheduler with dependency chaining and
//! aliasing-safe buffer views.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Weft sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use weft::prelude::*;
//!
//! let scheduler = Scheduler::new(SchedulerConfig::with_workers(2)).unwrap();
//! let registry = scheduler.registry();
//! let values = registry
//!     .create_from_slice(&[1.0f32, 2.0, 3.0, 4.0], LifetimeClass::Persistent)
//!     .unwrap();
//!
//! // Stage 1 doubles every value; stage 2 adds one, after stage 1.
//! let double = Task::parallel_for(
//!     "double",
//!     values.len(),
//!     values.view_all(AccessMode::ReadWrite).unwrap(),
//!     |i, v| v.update(i, |x| x * 2.0),
//! );
//! let first = scheduler.schedule(double, 2, &[]).unwrap();
//!
//! let add_one = Task::parallel_for(
//!     "add-one",
//!     values.len(),
//!     values.view_all(AccessMode::ReadWrite).unwrap(),
//!     |i, v| v.update(i, |x| x + 1.0),
//! );
//! let second = scheduler.schedule(add_one, 2, &[first]).unwrap();
//!
//! second.complete().unwrap();
//! assert_eq!(values.to_vec().unwrap(), vec![3.0, 5.0, 7.0, 9.0]);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `weft-core` | IDs, access modes, lifetime classes, errors |
//! | [`buffer`] | `weft-buffer` | Buffers, views, registry, overlap tests |
//! | [`sched`] | `weft-sched` | Tasks, handles, scheduler, chains |
//! | [`kernels`] | `weft-kernels` | Reference payloads |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and errors (`weft-core`).
pub use weft_core as types;

/// Buffers, typed views, and the byte-footprint overlap test
/// (`weft-buffer`).
///
/// Most users only need [`buffer::Buffer`] and [`buffer::BufferView`];
/// both are in the [`prelude`].
pub use weft_buffer as buffer;

/// The scheduler, tasks, and handles (`weft-sched`).
pub use weft_sched as sched;

/// Reference payloads: RGB channel effects, motion, point clouds, bounds
/// (`weft-kernels`).
pub use weft_kernels as kernels;

/// Common imports for typical Weft usage.
///
/// ```rust
/// use weft::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use weft_core::{AccessMode, BufferId, CycleId, LifetimeClass, RegistryId, TaskId};

    // Errors
    pub use weft_core::{BufferError, PayloadFailure, ScheduleError, TaskError};

    // Buffers
    pub use weft_buffer::{Buffer, BufferRegistry, BufferView, RegistryConfig};

    // Scheduling
    pub use weft_sched::{
        Chain, CompletionState, Diagnostic, DiagnosticsConfig, Scheduler, SchedulerConfig,
        Task, TaskHandle,
    };
}
