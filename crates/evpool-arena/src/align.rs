//! Block header alignment policy.
//!
//! Every block starts with a small header. The element run that follows
//! begins at [`header_span`], which is a multiple of [`block_align`], so the
//! first slot is correctly aligned for any supported element type.

use std::mem::align_of;

const fn max(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}

/// Fixed floor applied regardless of the platform's fundamental alignment.
pub const MIN_BLOCK_ALIGN: usize = 32;

/// Largest fundamental alignment among the primitive types.
pub const MAX_FUNDAMENTAL_ALIGN: usize = max(
    max(align_of::<u128>(), align_of::<f64>()),
    max(align_of::<u64>(), align_of::<usize>()),
);

/// Minimum alignment of every block region and of the element run within it.
pub const ALIGNMENT_FLOOR: usize = max(MAX_FUNDAMENTAL_ALIGN, MIN_BLOCK_ALIGN);

/// The alignment floor as a function, for call sites that prefer one.
pub const fn alignment_floor() -> usize {
    ALIGNMENT_FLOOR
}

/// Alignment of a block whose elements need `element_align`.
pub const fn block_align(element_align: usize) -> usize {
    max(ALIGNMENT_FLOOR, element_align)
}

/// Offset of the element run within a block: `header_size` padded out to
/// [`block_align`].
pub const fn header_span(header_size: usize, element_align: usize) -> usize {
    let align = block_align(element_align);
    // header_size is a small struct size; overflow is not reachable.
    (header_size + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_is_at_least_32_and_power_of_two() {
        assert!(ALIGNMENT_FLOOR >= 32);
        assert!(ALIGNMENT_FLOOR.is_power_of_two());
        assert!(alignment_floor() >= MAX_FUNDAMENTAL_ALIGN);
    }

    #[test]
    fn block_align_respects_over_aligned_elements() {
        assert_eq!(block_align(4), ALIGNMENT_FLOOR);
        assert_eq!(block_align(128), 128usize.max(ALIGNMENT_FLOOR));
    }

    #[test]
    fn header_span_is_multiple_of_block_align() {
        for &(size, align) in &[(1, 1), (24, 8), (33, 16), (8, 256)] {
            let span = header_span(size, align);
            assert!(span >= size);
            assert_eq!(span % block_align(align), 0);
        }
    }
}
