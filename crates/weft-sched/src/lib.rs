//! Parallel-for task scheduler for the Weft job system.
//!
//! A [`Task`] is a payload over an index domain plus the buffer views it
//! touches. [`Scheduler::schedule`] splits the domain into batches, gates
//! the task on its prerequisite [`TaskHandle`]s, and hands batches to a
//! fixed pool of worker threads. [`TaskHandle::complete`] blocks until
//! every batch has run and re-raises any payload failure.
//!
//! # Architecture
//!
//! ```text
//! caller thread                         worker threads (weft-worker-{i})
//! ─────────────                         ───────────────────────────────
//! schedule(task, width, &[prereqs])     recv WorkerMsg::Run(record)
//!   ├── AliasingValidator (debug)         └── claim batch from cursor
//!   ├── in-flight buffer claims               ├── catch_unwind(payload)
//!   ├── register with prerequisites           └── last batch → finish
//!   └── dispatch when gate opens ──────►          ├── release claims
//!                                                 ├── retire from live set
//!                                                 ├── mark Complete, notify
//! handle.complete() ◄── Condvar ──────────────────┤
//!                                                 └── dispatch dependents
//! ```
//!
//! Dependency sets are a DAG by construction: a task can only name handles
//! that already exist. A failed prerequisite skips its dependents' payloads
//! and surfaces on every one of them.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod config;
pub mod handle;
pub mod metrics;
mod pool;
mod record;
pub mod scheduler;
pub mod task;
pub mod validator;

pub use chain::Chain;
pub use config::{ConfigError, Diagnostic, DiagnosticsConfig, SchedulerConfig};
pub use handle::{CompletionState, TaskHandle};
pub use metrics::SchedulerMetrics;
pub use scheduler::{Scheduler, ShutdownReport};
pub use task::{Task, ViewSet};
pub use validator::{AliasingValidator, LiveTask};
