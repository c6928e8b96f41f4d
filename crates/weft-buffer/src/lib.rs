//! Typed buffers and aliasing-aware views for the Weft job scheduler.
//!
//! A [`BufferRegistry`] hands out [`Buffer`]s: fixed-length, zero-initialised
//! allocations of a plain-old-data element type, each tagged with a
//! [`LifetimeClass`](weft_core::LifetimeClass). A buffer is carved into
//! [`BufferView`]s, bounds-checked windows that may be strided (one struct
//! field across an array, one colour channel across an image) and that carry
//! an [`AccessMode`](weft_core::AccessMode).
//!
//! # Architecture
//!
//! ```text
//! BufferRegistry (Clone, shared with the scheduler)
//! ├── slots: generational BufferId allocation, capacity limits
//! ├── cycle counter + scoped-overdue detection
//! └── Buffer<T> ──owns──> Arc<BufferShared>
//!                          ├── ByteStorage (Box<[AtomicU8]>)
//!                          └── Mutex<UseState> (released, readers, writers)
//!     BufferView<U> ──shares──┘
//! ```
//!
//! Storage bytes are atomic cells accessed with relaxed ordering, so
//! disjoint writers never need `unsafe` and racing writers are a logic bug
//! rather than undefined behaviour. Ordering between tasks comes from the
//! scheduler's completion protocol.
//!
//! The [`alias`] module decides whether two view footprints share a byte.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod alias;
pub mod buffer;
pub mod config;
pub mod element;
pub mod registry;
pub mod shared;
mod storage;
pub mod view;

pub use alias::{conflicts, overlaps};
pub use buffer::Buffer;
pub use config::RegistryConfig;
pub use element::Element;
pub use registry::{BufferRegistry, OverdueBuffer};
pub use shared::{BufferRef, ErasedView, InFlight, InFlightGuard};
pub use view::BufferView;
