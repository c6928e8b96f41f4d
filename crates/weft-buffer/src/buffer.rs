//! Owned buffers.

use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::Arc;

use weft_core::{AccessMode, BufferError, BufferId, CycleId, LifetimeClass};

use crate::element::Element;
use crate::registry::BufferRegistry;
use crate::shared::{BufferRef, BufferShared, InFlight};
use crate::view::{check_view, fits_within, BufferView};

/// A fixed-length allocation of `T`, created by a [`BufferRegistry`].
///
/// The buffer is the single owner of its registry entry: it is released
/// exactly once, either by [`release`](Self::release) or on drop. Views may
/// outlive the buffer; a task scheduled over a view of a released buffer is
/// rejected.
pub struct Buffer<T: Element> {
    registry: BufferRegistry,
    shared: Arc<BufferShared>,
    len: usize,
    lifetime: LifetimeClass,
    allocated: CycleId,
    released: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Element> Buffer<T> {
    pub(crate) fn new(
        registry: BufferRegistry,
        shared: Arc<BufferShared>,
        len: usize,
        lifetime: LifetimeClass,
    ) -> Self {
        let allocated = registry.current_cycle();
        Self {
            registry,
            shared,
            len,
            lifetime,
            allocated,
            released: false,
            _marker: PhantomData,
        }
    }

    /// The buffer's id.
    pub fn id(&self) -> BufferId {
        self.shared.id
    }

    /// Length in elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always `false`: buffers hold at least one element.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Length in bytes.
    pub fn byte_len(&self) -> usize {
        self.shared.storage.len()
    }

    /// The lifetime class given at creation.
    pub fn lifetime(&self) -> LifetimeClass {
        self.lifetime
    }

    /// Cycle current at creation.
    pub fn allocated_cycle(&self) -> CycleId {
        self.allocated
    }

    /// Whether [`release`](Self::release) has succeeded.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Outstanding tasks that use this buffer.
    pub fn in_flight(&self) -> InFlight {
        self.shared.state().in_flight
    }

    /// Type-erased reference for the scheduler.
    pub fn buffer_ref(&self) -> BufferRef {
        BufferRef {
            shared: Arc::clone(&self.shared),
        }
    }

    fn ensure_live(&self) -> Result<(), BufferError> {
        if self.released {
            return Err(BufferError::UseAfterRelease { buffer: self.id() });
        }
        Ok(())
    }

    /// A view of `count` elements of `U`, element `i` at
    /// `byte_offset + i * stride`.
    ///
    /// Fails with [`BufferError::InvalidStride`] if `count > 1` and
    /// `stride < size_of::<U>()` (or `U` is zero-sized), and with
    /// [`BufferError::OutOfBounds`] if the last element would end past the
    /// buffer. A zero-count view is valid for any `byte_offset <= byte_len`.
    pub fn view<U: Element>(
        &self,
        byte_offset: usize,
        stride: usize,
        count: usize,
        mode: AccessMode,
    ) -> Result<BufferView<U>, BufferError> {
        self.ensure_live()?;
        check_view(
            self.id(),
            self.byte_len(),
            byte_offset,
            stride,
            count,
            size_of::<U>(),
        )?;
        Ok(BufferView::new(
            Arc::clone(&self.shared),
            byte_offset,
            stride,
            count,
            mode,
        ))
    }

    /// Contiguous view of every element.
    pub fn view_all(&self, mode: AccessMode) -> Result<BufferView<T>, BufferError> {
        self.view(0, size_of::<T>(), self.len, mode)
    }

    /// One field of every element: a `U` at `field_offset` within each `T`.
    ///
    /// With `T = [f32; 4]`, `field_view::<f32>(12, ..)` is the `w` lane of
    /// every point.
    pub fn field_view<U: Element>(
        &self,
        field_offset: usize,
        mode: AccessMode,
    ) -> Result<BufferView<U>, BufferError> {
        if !fits_within(field_offset, size_of::<U>(), size_of::<T>()) {
            return Err(BufferError::OutOfBounds {
                buffer: self.id(),
                byte_offset: field_offset,
                stride: size_of::<T>(),
                count: self.len,
                element_size: size_of::<U>(),
                buffer_bytes: self.byte_len(),
            });
        }
        self.view(field_offset, size_of::<T>(), self.len, mode)
    }

    /// Copy `data` into the buffer.
    ///
    /// Rejected with [`BufferError::BufferInUse`] while any task that uses
    /// the buffer is outstanding.
    pub fn copy_from(&mut self, data: &[T]) -> Result<(), BufferError> {
        self.ensure_live()?;
        self.check_len(data.len())?;
        let state = self.shared.state();
        if !state.in_flight.is_idle() {
            return Err(self.in_use(state.in_flight));
        }
        let elem = size_of::<T>();
        for (i, value) in data.iter().enumerate() {
            self.shared.storage.store(i * elem, *value);
        }
        Ok(())
    }

    /// Copy the buffer into `out`.
    ///
    /// Rejected with [`BufferError::BufferInUse`] while a task that may
    /// write the buffer is outstanding; outstanding readers are fine.
    pub fn copy_to(&self, out: &mut [T]) -> Result<(), BufferError> {
        self.ensure_live()?;
        self.check_len(out.len())?;
        let state = self.shared.state();
        if state.in_flight.writers > 0 {
            return Err(self.in_use(state.in_flight));
        }
        let elem = size_of::<T>();
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.shared.storage.load(i * elem);
        }
        Ok(())
    }

    /// Copy the buffer into a new `Vec`. Same rules as
    /// [`copy_to`](Self::copy_to).
    pub fn to_vec(&self) -> Result<Vec<T>, BufferError> {
        let mut out = vec![T::zeroed(); self.len];
        self.copy_to(&mut out)?;
        Ok(out)
    }

    fn check_len(&self, actual: usize) -> Result<(), BufferError> {
        if actual != self.len {
            return Err(BufferError::LengthMismatch {
                buffer: self.id(),
                expected: self.len,
                actual,
            });
        }
        Ok(())
    }

    fn in_use(&self, in_flight: InFlight) -> BufferError {
        BufferError::BufferInUse {
            buffer: self.id(),
            readers: in_flight.readers,
            writers: in_flight.writers,
        }
    }

    /// Return the buffer's slot and bytes to the registry.
    ///
    /// Fails with [`BufferError::UseAfterRelease`] on a second call and
    /// with [`BufferError::BufferInUse`] while tasks that use the buffer
    /// are outstanding; the buffer stays live in that case.
    pub fn release(&mut self) -> Result<(), BufferError> {
        self.ensure_live()?;
        {
            let mut state = self.shared.state();
            if !state.in_flight.is_idle() {
                return Err(self.in_use(state.in_flight));
            }
            state.released = true;
        }
        self.released = true;
        self.registry.unregister(self.id());
        tracing::trace!(buffer = %self.id(), "buffer released");
        Ok(())
    }
}

impl<T: Element> Drop for Buffer<T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let in_flight = {
            let mut state = self.shared.state();
            state.released = true;
            state.in_flight
        };
        if !in_flight.is_idle() {
            tracing::warn!(
                buffer = %self.id(),
                readers = in_flight.readers,
                writers = in_flight.writers,
                "buffer dropped while tasks that use it are outstanding"
            );
        }
        self.released = true;
        self.registry.unregister(self.id());
    }
}

impl<T: Element> fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id())
            .field("element_type", &self.shared.element_type)
            .field("len", &self.len)
            .field("lifetime", &self.lifetime)
            .field("allocated", &self.allocated)
            .field("released", &self.released)
            .finish()
    }
}
