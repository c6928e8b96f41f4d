//! Typed, bounds-checked windows over a buffer.

use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::Arc;

use weft_core::{AccessMode, BufferError, BufferId, ViewDescriptor};

use crate::element::Element;
use crate::shared::{BufferRef, BufferShared, ErasedView};

/// Check the view invariant for a buffer of `buffer_bytes` bytes.
///
/// `byte_offset + stride * (count - 1) + element_size <= buffer_bytes`, with
/// `stride >= element_size` whenever `count > 1`. An empty view only needs
/// `byte_offset <= buffer_bytes`.
pub(crate) fn check_view(
    buffer: BufferId,
    buffer_bytes: usize,
    byte_offset: usize,
    stride: usize,
    count: usize,
    element_size: usize,
) -> Result<(), BufferError> {
    let out_of_bounds = || BufferError::OutOfBounds {
        buffer,
        byte_offset,
        stride,
        count,
        element_size,
        buffer_bytes,
    };
    if count == 0 {
        return if byte_offset <= buffer_bytes {
            Ok(())
        } else {
            Err(out_of_bounds())
        };
    }
    if element_size == 0 || (count > 1 && stride < element_size) {
        return Err(BufferError::InvalidStride {
            buffer,
            stride,
            element_size,
        });
    }
    let end = stride
        .checked_mul(count - 1)
        .and_then(|span| span.checked_add(element_size))
        .and_then(|span| span.checked_add(byte_offset))
        .ok_or_else(out_of_bounds)?;
    if end > buffer_bytes {
        return Err(out_of_bounds());
    }
    Ok(())
}

/// Whether a field of `field_size` bytes at `field_offset` lies inside an
/// element of `element_size` bytes.
pub(crate) fn fits_within(field_offset: usize, field_size: usize, element_size: usize) -> bool {
    field_offset
        .checked_add(field_size)
        .is_some_and(|end| end <= element_size)
}

/// A window of `len()` elements of `U` over a buffer.
///
/// Element `i` lives at byte `byte_offset + i * stride`. Views are cheap to
/// clone and may be handed to many tasks; whether two views may be used by
/// concurrently runnable tasks is decided by the scheduler from their
/// [`descriptor`](Self::descriptor)s.
///
/// Index access is bounds-checked and panics when out of range. Mode misuse
/// (writing through a read-only view) is caught by a debug assertion.
pub struct BufferView<U: Element> {
    shared: Arc<BufferShared>,
    byte_offset: usize,
    stride: usize,
    count: usize,
    mode: AccessMode,
    _marker: PhantomData<fn() -> U>,
}

impl<U: Element> BufferView<U> {
    pub(crate) fn new(
        shared: Arc<BufferShared>,
        byte_offset: usize,
        stride: usize,
        count: usize,
        mode: AccessMode,
    ) -> Self {
        Self {
            shared,
            byte_offset,
            stride,
            count,
            mode,
            _marker: PhantomData,
        }
    }

    #[inline]
    fn offset_of(&self, index: usize) -> usize {
        assert!(
            index < self.count,
            "index {index} out of range for view of {} elements",
            self.count
        );
        self.byte_offset + index * self.stride
    }

    /// Load element `index`.
    #[inline]
    pub fn get(&self, index: usize) -> U {
        debug_assert!(self.mode.can_read(), "read through a {} view", self.mode);
        self.shared.storage.load(self.offset_of(index))
    }

    /// Load element `index`, or `None` if it is out of range.
    pub fn try_get(&self, index: usize) -> Option<U> {
        (index < self.count).then(|| self.get(index))
    }

    /// Store `value` at element `index`.
    #[inline]
    pub fn set(&self, index: usize, value: U) {
        debug_assert!(self.mode.can_write(), "write through a {} view", self.mode);
        self.shared.storage.store(self.offset_of(index), value);
    }

    /// Replace element `index` with `f(old)`.
    #[inline]
    pub fn update(&self, index: usize, f: impl FnOnce(U) -> U) {
        let offset = self.offset_of(index);
        debug_assert!(
            self.mode == AccessMode::ReadWrite,
            "update through a {} view",
            self.mode
        );
        let old = self.shared.storage.load(offset);
        self.shared.storage.store(offset, f(old));
    }

    /// Load every element into a new `Vec`.
    pub fn to_vec(&self) -> Vec<U> {
        (0..self.count).map(|i| self.get(i)).collect()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the view has no elements.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Permitted access.
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Byte offset of element 0.
    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Bytes between consecutive elements.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The viewed buffer's id.
    pub fn buffer_id(&self) -> BufferId {
        self.shared.id
    }

    /// Whether the viewed buffer has not been released.
    pub fn is_live(&self) -> bool {
        self.shared.is_live()
    }

    /// The view's byte footprint.
    pub fn descriptor(&self) -> ViewDescriptor {
        ViewDescriptor {
            buffer: self.shared.id,
            byte_offset: self.byte_offset,
            stride: self.stride,
            element_size: size_of::<U>(),
            count: self.count,
            mode: self.mode,
        }
    }

    /// Footprint plus buffer reference, for the scheduler.
    pub fn erase(&self) -> ErasedView {
        ErasedView {
            descriptor: self.descriptor(),
            buffer: BufferRef {
                shared: Arc::clone(&self.shared),
            },
        }
    }

    /// Project one field of every element: a `F` at `offset_in_element`
    /// within each `U`. The mode is preserved.
    pub fn field<F: Element>(&self, offset_in_element: usize) -> Result<BufferView<F>, BufferError> {
        let buffer_bytes = self.shared.storage.len();
        if !fits_within(offset_in_element, size_of::<F>(), size_of::<U>()) {
            return Err(BufferError::OutOfBounds {
                buffer: self.shared.id,
                byte_offset: self.byte_offset + offset_in_element,
                stride: self.stride,
                count: self.count,
                element_size: size_of::<F>(),
                buffer_bytes,
            });
        }
        let byte_offset = self.byte_offset + offset_in_element;
        check_view(
            self.shared.id,
            buffer_bytes,
            byte_offset,
            self.stride,
            self.count,
            size_of::<F>(),
        )?;
        Ok(BufferView::new(
            Arc::clone(&self.shared),
            byte_offset,
            self.stride,
            self.count,
            self.mode,
        ))
    }

    /// The same window with read-only access.
    pub fn read_only(&self) -> BufferView<U> {
        BufferView::new(
            Arc::clone(&self.shared),
            self.byte_offset,
            self.stride,
            self.count,
            AccessMode::ReadOnly,
        )
    }
}

impl<U: Element> Clone for BufferView<U> {
    fn clone(&self) -> Self {
        BufferView::new(
            Arc::clone(&self.shared),
            self.byte_offset,
            self.stride,
            self.count,
            self.mode,
        )
    }
}

impl<U: Element> fmt::Debug for BufferView<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferView")
            .field("buffer", &self.shared.id)
            .field("element_type", &std::any::type_name::<U>())
            .field("byte_offset", &self.byte_offset)
            .field("stride", &self.stride)
            .field("count", &self.count)
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BufferRegistry;
    use weft_core::{LifetimeClass, RegistryId};

    const ID: BufferId = BufferId::new(RegistryId(0), 0, 0);

    #[test]
    fn exactly_filling_view_is_valid() {
        // 10 i32 = 40 bytes.
        assert!(check_view(ID, 40, 0, 4, 10, 4).is_ok());
        assert!(check_view(ID, 40, 4, 4, 9, 4).is_ok());
    }

    #[test]
    fn one_over_is_out_of_bounds() {
        assert!(matches!(
            check_view(ID, 40, 0, 4, 11, 4),
            Err(BufferError::OutOfBounds { .. })
        ));
        assert!(matches!(
            check_view(ID, 40, 1, 4, 10, 4),
            Err(BufferError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn empty_view_needs_offset_within_buffer() {
        assert!(check_view(ID, 40, 40, 4, 0, 4).is_ok());
        assert!(check_view(ID, 40, 41, 4, 0, 4).is_err());
    }

    #[test]
    fn overlapping_stride_is_invalid() {
        assert!(matches!(
            check_view(ID, 40, 0, 2, 4, 4),
            Err(BufferError::InvalidStride { .. })
        ));
        // A single element ignores its stride.
        assert!(check_view(ID, 40, 0, 0, 1, 4).is_ok());
    }

    #[test]
    fn huge_stride_overflow_is_out_of_bounds() {
        assert!(matches!(
            check_view(ID, 40, 0, usize::MAX, 3, 4),
            Err(BufferError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn strided_channel_view_reads_interleaved_bytes() {
        let reg = BufferRegistry::default();
        let buf = reg
            .create_from_slice::<u8>(&[10, 20, 30, 40, 11, 21, 31, 41], LifetimeClass::Persistent)
            .unwrap();
        let green = buf.view::<u8>(1, 4, 2, AccessMode::ReadWrite).unwrap();
        assert_eq!(green.to_vec(), vec![20, 21]);
        green.update(1, |g| g + 1);
        assert_eq!(buf.to_vec().unwrap(), vec![10, 20, 30, 40, 11, 22, 31, 41]);
    }

    #[test]
    fn field_projection_of_a_view() {
        let reg = BufferRegistry::default();
        let buf = reg
            .create_from_slice::<[f32; 4]>(
                &[[1.0, 2.0, 3.0, 0.5], [4.0, 5.0, 6.0, 0.25]],
                LifetimeClass::Persistent,
            )
            .unwrap();
        let all = buf.view_all(AccessMode::ReadOnly).unwrap();
        let w = all.field::<f32>(12).unwrap();
        assert_eq!(w.to_vec(), vec![0.5, 0.25]);
        assert_eq!(w.mode(), AccessMode::ReadOnly);
        assert!(all.field::<f32>(14).is_err());
    }

    #[test]
    fn try_get_out_of_range() {
        let reg = BufferRegistry::default();
        let buf = reg.create::<u32>(2, LifetimeClass::Persistent).unwrap();
        let v = buf.view_all(AccessMode::ReadOnly).unwrap();
        assert_eq!(v.try_get(1), Some(0));
        assert_eq!(v.try_get(2), None);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn get_out_of_range_panics() {
        let reg = BufferRegistry::default();
        let buf = reg.create::<u32>(2, LifetimeClass::Persistent).unwrap();
        buf.view_all(AccessMode::ReadOnly).unwrap().get(2);
    }

    #[test]
    fn view_outlives_release_but_reports_dead() {
        let reg = BufferRegistry::default();
        let mut buf = reg.create::<u32>(2, LifetimeClass::Persistent).unwrap();
        let v = buf.view_all(AccessMode::ReadOnly).unwrap();
        assert!(v.is_live());
        buf.release().unwrap();
        assert!(!v.is_live());
        assert_eq!(v.buffer_id(), buf.id());
    }
}
