//! State shared between a buffer, its views, and the scheduler.
//!
//! [`BufferRef`] is the type-erased handle the scheduler works with: it can
//! check liveness and take an [`InFlightGuard`] that keeps the buffer from
//! being released or copied over while a task that uses it is outstanding.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use weft_core::{BufferError, BufferId, ViewDescriptor};

use crate::storage::ByteStorage;

/// Counts of outstanding tasks that use a buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InFlight {
    /// Tasks whose views of the buffer are all read-only.
    pub readers: usize,
    /// Tasks holding at least one view of the buffer that may write.
    pub writers: usize,
}

impl InFlight {
    /// No task uses the buffer.
    pub fn is_idle(&self) -> bool {
        self.readers == 0 && self.writers == 0
    }
}

#[derive(Default)]
pub(crate) struct UseState {
    pub(crate) released: bool,
    pub(crate) in_flight: InFlight,
}

pub(crate) struct BufferShared {
    pub(crate) id: BufferId,
    pub(crate) storage: ByteStorage,
    pub(crate) element_type: &'static str,
    state: Mutex<UseState>,
}

impl BufferShared {
    pub(crate) fn new(id: BufferId, storage: ByteStorage, element_type: &'static str) -> Self {
        Self {
            id,
            storage,
            element_type,
            state: Mutex::new(UseState::default()),
        }
    }

    /// Lock the use state. Nothing panics while holding it, so a poisoned
    /// lock still holds consistent counters.
    pub(crate) fn state(&self) -> MutexGuard<'_, UseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_live(&self) -> bool {
        !self.state().released
    }
}

/// Type-erased, cloneable reference to a buffer's shared state.
#[derive(Clone)]
pub struct BufferRef {
    pub(crate) shared: Arc<BufferShared>,
}

impl BufferRef {
    /// The buffer's id.
    pub fn id(&self) -> BufferId {
        self.shared.id
    }

    /// Whether the buffer has not been released.
    pub fn is_live(&self) -> bool {
        self.shared.is_live()
    }

    /// Current outstanding-task counts.
    pub fn in_flight(&self) -> InFlight {
        self.shared.state().in_flight
    }

    /// Register an outstanding task. The registration lasts until the guard
    /// is dropped.
    ///
    /// Fails with [`BufferError::UseAfterRelease`] if the buffer has been
    /// released; the check and the increment happen under one lock, so a
    /// concurrent `release` either sees the task or the task sees the
    /// release.
    pub fn acquire(&self, writes: bool) -> Result<InFlightGuard, BufferError> {
        let mut state = self.shared.state();
        if state.released {
            return Err(BufferError::UseAfterRelease {
                buffer: self.shared.id,
            });
        }
        if writes {
            state.in_flight.writers += 1;
        } else {
            state.in_flight.readers += 1;
        }
        Ok(InFlightGuard {
            shared: Arc::clone(&self.shared),
            writes,
        })
    }
}

impl fmt::Debug for BufferRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferRef")
            .field("id", &self.shared.id)
            .field("element_type", &self.shared.element_type)
            .field("byte_len", &self.shared.storage.len())
            .finish()
    }
}

/// An outstanding task's claim on a buffer. Dropping it ends the claim.
pub struct InFlightGuard {
    shared: Arc<BufferShared>,
    writes: bool,
}

impl InFlightGuard {
    /// The claimed buffer.
    pub fn buffer(&self) -> BufferId {
        self.shared.id
    }

    /// Whether the claim permits writes.
    pub fn writes(&self) -> bool {
        self.writes
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut state = self.shared.state();
        let counter = if self.writes {
            &mut state.in_flight.writers
        } else {
            &mut state.in_flight.readers
        };
        *counter = counter.saturating_sub(1);
    }
}

impl fmt::Debug for InFlightGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightGuard")
            .field("buffer", &self.shared.id)
            .field("writes", &self.writes)
            .finish()
    }
}

/// A view with its element type stripped: footprint plus buffer reference.
#[derive(Clone, Debug)]
pub struct ErasedView {
    /// Byte footprint and access mode.
    pub descriptor: ViewDescriptor,
    /// The viewed buffer.
    pub buffer: BufferRef,
}
