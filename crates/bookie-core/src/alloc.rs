//! Aligned record footprints.
//!
//! Every entry stored in the write cache occupies a footprint rounded up to
//! [`ALIGNMENT`] bytes, so that entries written by different threads never
//! share an L1 cache line and placement inside a segment stays predictable.

/// Alignment unit for stored record footprints (one cache line).
pub const ALIGNMENT: usize = 64;

/// Rounds `size` up to the next multiple of [`ALIGNMENT`].
///
/// A zero-length record has a zero footprint.
///
/// # Example
///
/// ```
/// use bookie_core::align64;
///
/// assert_eq!(align64(0), 0);
/// assert_eq!(align64(1), 64);
/// assert_eq!(align64(64), 64);
/// assert_eq!(align64(70), 128);
/// ```
#[inline]
#[must_use]
pub const fn align64(size: usize) -> usize {
    (size + (ALIGNMENT - 1)) & !(ALIGNMENT - 1)
}

/// Checked variant of [`align64`] for sizes close to `usize::MAX`.
///
/// Returns `None` if the aligned footprint would overflow.
#[inline]
#[must_use]
pub const fn checked_align64(size: usize) -> Option<usize> {
    match size.checked_add(ALIGNMENT - 1) {
        Some(padded) => Some(padded & !(ALIGNMENT - 1)),
        None => None,
    }
}
