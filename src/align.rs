/// Rounds `value` up to the next multiple of `to`, which must be a power of
/// two. Returns `None` on overflow.
///
/// # Examples
///
/// ```text
/// align_up(13, 16)   == Some(16)
/// align_up(4097, 4096) == Some(8192)
/// ```
#[inline]
pub(crate) const fn align_up(value: usize, to: usize) -> Option<usize> {
    match value.checked_add(to - 1) {
        Some(sum) => Some(sum & !(to - 1)),
        None => None,
    }
}

/// Rounds `value` down to the previous multiple of `to`, which must be a
/// power of two.
#[inline]
pub(crate) const fn align_down(value: usize, to: usize) -> usize {
    value & !(to - 1)
}
