//! Type-erased view descriptors.
//!
//! A [`ViewDescriptor`] is the shape of a typed buffer view with the element
//! type stripped away: which buffer, which bytes, and how they may be
//! touched. The aliasing validator works entirely on descriptors.

use smallvec::SmallVec;
use std::fmt;

use crate::access::AccessMode;
use crate::id::BufferId;

/// The byte footprint and access mode of one buffer view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ViewDescriptor {
    /// The buffer the view covers.
    pub buffer: BufferId,
    /// Byte offset of element 0 within the buffer.
    pub byte_offset: usize,
    /// Distance in bytes between consecutive elements.
    pub stride: usize,
    /// Size in bytes of one viewed element.
    pub element_size: usize,
    /// Number of elements in the view.
    pub count: usize,
    /// Permitted access.
    pub mode: AccessMode,
}

impl ViewDescriptor {
    /// Whether the view covers no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.count == 0 || self.element_size == 0
    }

    /// Half-open byte range spanned by the view, gaps included.
    ///
    /// Empty views span `byte_offset..byte_offset`.
    pub fn extent(&self) -> std::ops::Range<usize> {
        if self.is_empty() {
            return self.byte_offset..self.byte_offset;
        }
        let end = self.byte_offset + self.stride * (self.count - 1) + self.element_size;
        self.byte_offset..end
    }

    /// Whether consecutive elements leave no gaps (`stride == element_size`)
    /// or there is at most one element.
    pub fn is_contiguous(&self) -> bool {
        self.count <= 1 || self.stride == self.element_size
    }
}

impl fmt::Display for ViewDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}+{}*{} x{}B, {}]",
            self.buffer, self.byte_offset, self.stride, self.count, self.element_size, self.mode
        )
    }
}

/// Inline storage for the handful of views a typical task holds.
pub type ViewDescriptors = SmallVec<[ViewDescriptor; 4]>;
