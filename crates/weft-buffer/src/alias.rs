//! Byte-footprint aliasing between views.
//!
//! Every test here is exact: a `true` from [`overlaps`] means some byte is
//! covered by an element of both views, never a conservative guess. That is
//! what lets R, G and B channel views of one interleaved image be written by
//! independent tasks.

use std::ops::Range;

use weft_core::ViewDescriptor;

/// Whether `a` and `b` cover a common byte of the same buffer.
///
/// - Contiguous against anything: O(1) interval test.
/// - Equal strides: O(1), via the two element pairings that can land within
///   one stride of each other.
/// - Mixed strides: two-pointer walk over both element sequences, skipping
///   runs that cannot intersect.
pub fn overlaps(a: &ViewDescriptor, b: &ViewDescriptor) -> bool {
    if a.buffer != b.buffer || a.is_empty() || b.is_empty() {
        return false;
    }
    if !ranges_intersect(&a.extent(), &b.extent()) {
        return false;
    }
    if a.is_contiguous() {
        return hits_range(b, &a.extent());
    }
    if b.is_contiguous() {
        return hits_range(a, &b.extent());
    }
    if a.stride == b.stride {
        return equal_stride_overlap(a, b);
    }
    merge_overlap(a, b)
}

/// Whether `a` and `b` may not be used concurrently: same buffer, at least
/// one side may write, and the footprints share a byte.
pub fn conflicts(a: &ViewDescriptor, b: &ViewDescriptor) -> bool {
    a.buffer == b.buffer && a.mode.conflicts_with(b.mode) && overlaps(a, b)
}

fn ranges_intersect(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Index of the first element of `v` that ends after byte `x`.
/// Requires a non-zero stride.
fn first_ending_after(v: &ViewDescriptor, x: usize) -> usize {
    if v.byte_offset + v.element_size > x {
        0
    } else {
        (x - v.byte_offset - v.element_size) / v.stride + 1
    }
}

/// Whether any element of non-empty `v` intersects non-empty `range`.
fn hits_range(v: &ViewDescriptor, range: &Range<usize>) -> bool {
    if v.is_contiguous() {
        return ranges_intersect(&v.extent(), range);
    }
    let j = first_ending_after(v, range.start);
    j < v.count && v.byte_offset + j * v.stride < range.end
}

fn equal_stride_overlap(a: &ViewDescriptor, b: &ViewDescriptor) -> bool {
    // Pair a[i] with b[i - k]: their start distance is d + k*s. Only the k
    // putting that distance in (-s, s] can satisfy -ea < dist < eb.
    let s = a.stride as i128;
    let d = a.byte_offset as i128 - b.byte_offset as i128;
    let (ea, eb) = (a.element_size as i128, b.element_size as i128);
    let (ca, cb) = (a.count as i128, b.count as i128);
    let k0 = (-d).div_euclid(s);
    (k0..=k0 + 1).any(|k| {
        let dist = d + k * s;
        -ea < dist && dist < eb && k.max(0) < ca.min(cb + k)
    })
}

fn merge_overlap(a: &ViewDescriptor, b: &ViewDescriptor) -> bool {
    let (mut i, mut j) = (0usize, 0usize);
    while i < a.count && j < b.count {
        let a_start = a.byte_offset + i * a.stride;
        let b_start = b.byte_offset + j * b.stride;
        let a_end = a_start + a.element_size;
        let b_end = b_start + b.element_size;
        if a_start < b_end && b_start < a_end {
            return true;
        }
        if a_end <= b_start {
            i = first_ending_after(a, b_start).max(i + 1);
        } else {
            j = first_ending_after(b, a_start).max(j + 1);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::{AccessMode, BufferId, RegistryId};

    fn view(byte_offset: usize, stride: usize, element_size: usize, count: usize) -> ViewDescriptor {
        ViewDescriptor {
            buffer: BufferId::new(RegistryId(0), 0, 0),
            byte_offset,
            stride,
            element_size,
            count,
            mode: AccessMode::ReadWrite,
        }
    }

    #[test]
    fn rgb_channels_are_disjoint() {
        let r = view(0, 4, 1, 100);
        let g = view(1, 4, 1, 100);
        let b = view(2, 4, 1, 100);
        assert!(!overlaps(&r, &g));
        assert!(!overlaps(&g, &b));
        assert!(!overlaps(&r, &b));
        assert!(overlaps(&r, &r));
    }

    #[test]
    fn triplet_lanes_are_disjoint() {
        let lanes: Vec<_> = (0..3).map(|o| view(o * 4, 12, 4, 10)).collect();
        for (x, a) in lanes.iter().enumerate() {
            for (y, b) in lanes.iter().enumerate() {
                assert_eq!(overlaps(a, b), x == y);
            }
        }
    }

    #[test]
    fn full_view_overlaps_every_lane() {
        let full = view(0, 4, 4, 30);
        assert!(overlaps(&full, &view(8, 12, 4, 10)));
        assert!(overlaps(&view(8, 12, 4, 10), &full));
    }

    #[test]
    fn adjacent_ranges_do_not_overlap() {
        assert!(!overlaps(&view(0, 4, 4, 5), &view(20, 4, 4, 5)));
        assert!(overlaps(&view(0, 4, 4, 5), &view(19, 1, 1, 1)));
    }

    #[test]
    fn contiguous_range_inside_a_gap() {
        // Elements at 0..2, 8..10, 16..18; range 3..7 sits in the first gap.
        let strided = view(0, 8, 2, 3);
        assert!(!overlaps(&strided, &view(3, 1, 1, 4)));
        assert!(overlaps(&strided, &view(3, 1, 1, 6)));
    }

    #[test]
    fn mixed_strides() {
        // Elements at multiples of 6 vs multiples of 4 plus 2: 6 ∈ both.
        assert!(overlaps(&view(0, 6, 1, 5), &view(2, 4, 1, 5)));
        // Even bytes vs odd bytes never meet.
        assert!(!overlaps(&view(0, 4, 1, 10), &view(1, 6, 1, 7)));
    }

    #[test]
    fn equal_strides_aligned_and_misaligned() {
        // a[3] = 30..32 meets b[0] = 31..33.
        assert!(overlaps(&view(0, 10, 2, 4), &view(31, 10, 2, 2)));
        // Offsets 5 and 0 modulo 10 with 2-byte elements never meet.
        assert!(!overlaps(&view(5, 10, 2, 4), &view(0, 10, 2, 4)));
    }

    #[test]
    fn different_buffers_never_overlap() {
        let a = view(0, 4, 4, 4);
        let mut b = a;
        b.buffer = BufferId::new(RegistryId(0), 1, 0);
        assert!(!overlaps(&a, &b));
    }

    #[test]
    fn readers_do_not_conflict() {
        let mut a = view(0, 4, 4, 4);
        let mut b = a;
        a.mode = AccessMode::ReadOnly;
        b.mode = AccessMode::ReadOnly;
        assert!(overlaps(&a, &b));
        assert!(!conflicts(&a, &b));
        b.mode = AccessMode::WriteOnly;
        assert!(conflicts(&a, &b));
    }
}
