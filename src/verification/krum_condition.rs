//! Krum selection sizing.
//!
//! For `n` submitted updates the defense assumes up to `f = (n - 1) / 2`
//! Byzantine participants and keeps `m = n - f - 2` updates. When `m` is not
//! positive there are too few participants for the selection to mean anything.

/// Assumed Byzantine tolerance for `n` participants: `(n - 1) / 2`.
pub fn krum_tolerance(n: usize) -> usize {
    n.saturating_sub(1) / 2
}

/// Number of updates multi-Krum keeps for `n` participants.
///
/// Returns `None` when `n - f - 2 <= 0`.
pub fn krum_keep_count(n: usize) -> Option<usize> {
    let f = krum_tolerance(n);
    match n.checked_sub(f + 2) {
        Some(m) if m > 0 => Some(m),
        _ => None,
    }
}
