//! Core types for the Weft job scheduler.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! vocabulary shared by the buffer layer and the scheduler: generational
//! identifiers, access modes, lifetime classes, type-erased view
//! descriptors, and the error taxonomy.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod access;
pub mod error;
pub mod id;
pub mod view;

pub use access::{AccessMode, LifetimeClass};
pub use error::{BufferError, DataRaceReport, PayloadFailure, ScheduleError, TaskError};
pub use id::{BufferId, CycleId, RegistryId, TaskId};
pub use view::{ViewDescriptor, ViewDescriptors};
