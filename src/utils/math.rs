//! Alignment arithmetic shared by the layout algorithms.

/// Rounds `value` up to the next multiple of `mask + 1`.
///
/// `mask` is an alignment *mask* (alignment minus one), which is the form in which the runtime
/// stores alignment in value-witness flags. For a valid mask (`mask + 1` a power of two) the
/// result `r` satisfies `r >= value`, `r - value <= mask` and `r & mask == 0`, and aligning an
/// already aligned value is a no-op. Values within `mask` of `u64::MAX` saturate.
///
/// # Examples
///
/// ```rust
/// use metascope::utils::align_up;
///
/// assert_eq!(align_up(17, 7), 24);
/// assert_eq!(align_up(24, 7), 24);
/// assert_eq!(align_up(5, 0), 5);
/// ```
#[must_use]
pub fn align_up(value: u64, mask: u64) -> u64 {
    value.saturating_add(mask) & !mask
}
