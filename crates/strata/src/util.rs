/// Align `value` up to the next multiple of `align`.
/// `align` must be a power of two.
#[inline(always)]
pub const fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Align `value` down to the previous multiple of `align`.
/// `align` must be a power of two.
#[inline(always)]
pub const fn align_down(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}

/// Check if `value` is aligned to `align`.
#[inline(always)]
pub const fn is_aligned(value: usize, align: usize) -> bool {
    value & (align - 1) == 0
}

/// Minimum alignment of every heap allocation. Also the size of a free-list
/// section header, so headers never disturb the alignment of what follows.
pub const MIN_ALIGN: usize = 16;

/// Default stack size for spawned threads.
pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_next_multiple() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 16), 32);
        assert_eq!(align_up(100, 16), 112);
    }

    #[test]
    fn align_down_rounds_to_previous_multiple() {
        assert_eq!(align_down(0, 16), 0);
        assert_eq!(align_down(15, 16), 0);
        assert_eq!(align_down(17, 16), 16);
        assert_eq!(align_down(4097, 4096), 4096);
    }

    #[test]
    fn is_aligned_checks_mask() {
        assert!(is_aligned(0, 16));
        assert!(is_aligned(4096, 4096));
        assert!(!is_aligned(8, 16));
    }
}
