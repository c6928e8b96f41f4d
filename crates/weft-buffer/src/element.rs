//! The element bound for buffer contents.

use bytemuck::Pod;

/// A type that can live in a [`Buffer`](crate::Buffer) or be viewed through
/// a [`BufferView`](crate::BufferView).
///
/// Any `bytemuck::Pod` type qualifies: every bit pattern is a valid value
/// and there is no padding, so elements can be assembled from raw bytes and
/// reinterpreted as field slices without `unsafe`.
pub trait Element: Pod + Send + Sync {}

impl<T: Pod + Send + Sync> Element for T {}
