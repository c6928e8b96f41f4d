//! Atomic byte storage backing every buffer.

use std::sync::atomic::{AtomicU8, Ordering};

use bytemuck::Pod;
use weft_core::BufferError;

/// A fixed-length run of bytes that many threads may load and store
/// concurrently.
///
/// Every access is a relaxed per-byte atomic. Callers that need ordering
/// between a writer and a later reader must establish it externally.
pub(crate) struct ByteStorage {
    bytes: Box<[AtomicU8]>,
}

impl ByteStorage {
    /// Allocate `len` zeroed bytes, reporting allocator refusal instead of
    /// aborting.
    pub(crate) fn try_zeroed(len: usize) -> Result<Self, BufferError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|e| BufferError::AllocationFailed {
                requested_bytes: len,
                reason: e.to_string(),
            })?;
        bytes.resize_with(len, || AtomicU8::new(0));
        Ok(Self {
            bytes: bytes.into_boxed_slice(),
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Read a `T` starting at `offset`. Panics if the range is out of bounds.
    pub(crate) fn load<T: Pod>(&self, offset: usize) -> T {
        let mut value = T::zeroed();
        let dst = bytemuck::bytes_of_mut(&mut value);
        let src = &self.bytes[offset..offset + dst.len()];
        for (d, s) in dst.iter_mut().zip(src) {
            *d = s.load(Ordering::Relaxed);
        }
        value
    }

    /// Write a `T` starting at `offset`. Panics if the range is out of bounds.
    pub(crate) fn store<T: Pod>(&self, offset: usize, value: T) {
        let src = bytemuck::bytes_of(&value);
        let dst = &self.bytes[offset..offset + src.len()];
        for (d, s) in dst.iter().zip(src) {
            d.store(*s, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_on_allocation() {
        let s = ByteStorage::try_zeroed(16).unwrap();
        assert_eq!(s.len(), 16);
        assert_eq!(s.load::<u64>(8), 0);
    }

    #[test]
    fn unaligned_round_trip() {
        let s = ByteStorage::try_zeroed(16).unwrap();
        s.store::<u32>(3, 0xDEAD_BEEF);
        assert_eq!(s.load::<u32>(3), 0xDEAD_BEEF);
        assert_eq!(s.load::<u8>(2), 0);
        assert_eq!(s.load::<u8>(7), 0);
    }

    #[test]
    fn impossible_allocation_is_an_error() {
        let err = ByteStorage::try_zeroed(usize::MAX).err().unwrap();
        assert!(matches!(err, BufferError::AllocationFailed { .. }));
    }
}
