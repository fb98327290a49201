//! Two-level segregated-fit bin index.
//!
//! 256 size-class bins, grouped 8 per "top bin". Non-emptiness is tracked
//! in a 32-bit top mask plus one `u8` leaf mask per group, so finding the
//! smallest non-empty bin at or above a target class is two masked bit
//! scans: one over a `u32`, one over a `u8`.

use super::small_float::MANTISSA_BITS;

pub(crate) const NUM_TOP_BINS: usize = 32;
pub(crate) const BINS_PER_LEAF: usize = 8;
pub(crate) const TOP_BINS_INDEX_SHIFT: u32 = MANTISSA_BITS;
pub(crate) const LEAF_BINS_INDEX_MASK: u32 = (BINS_PER_LEAF - 1) as u32;
pub(crate) const NUM_LEAF_BINS: usize = NUM_TOP_BINS * BINS_PER_LEAF;

/// Index of the lowest set bit at or after `start`, or `None` if the mask
/// has no set bit there. `start >= 32` is a valid query and yields `None`.
#[inline]
pub(crate) fn lowest_set_bit_after(mask: u32, start: u32) -> Option<u32> {
    if start >= u32::BITS {
        return None;
    }
    let bits_after = mask & (u32::MAX << start);
    if bits_after == 0 {
        None
    } else {
        Some(bits_after.trailing_zeros())
    }
}

/// Occupancy bitmaps over the 256 leaf bins.
///
/// Invariant: bit `t` of `used_top` is set iff `used_leaf[t] != 0`, and
/// bit `l` of `used_leaf[t]` is set iff bin `t*8 + l` has a non-empty free
/// list. Maintained incrementally by the callers on every list insert and
/// remove, never recomputed by scanning.
pub(crate) struct BinMap {
    used_top: u32,
    used_leaf: [u8; NUM_TOP_BINS],
}

impl BinMap {
    pub(crate) fn new() -> Self {
        Self {
            used_top: 0,
            used_leaf: [0; NUM_TOP_BINS],
        }
    }

    /// Set the bit for `bin`. Idempotent.
    #[inline]
    pub(crate) fn mark_non_empty(&mut self, bin: u32) {
        let top = bin >> TOP_BINS_INDEX_SHIFT;
        let leaf = bin & LEAF_BINS_INDEX_MASK;
        self.used_leaf[top as usize] |= 1 << leaf;
        self.used_top |= 1 << top;
    }

    /// Clear the bit for `bin`, cascading into `used_top` when the group's
    /// leaf mask reaches zero.
    #[inline]
    pub(crate) fn mark_empty(&mut self, bin: u32) {
        let top = bin >> TOP_BINS_INDEX_SHIFT;
        let leaf = bin & LEAF_BINS_INDEX_MASK;
        self.used_leaf[top as usize] &= !(1 << leaf);
        if self.used_leaf[top as usize] == 0 {
            self.used_top &= !(1 << top);
        }
    }

    /// Smallest non-empty bin with index >= `min_bin`, or `None` when no
    /// such bin exists anywhere in the index.
    ///
    /// First a masked scan of the target group's leaf mask; on miss, a
    /// masked scan of `used_top` strictly above the target group. Any bin
    /// in a strictly higher group satisfies the bound, so its lowest leaf
    /// is taken unconditionally.
    pub(crate) fn find_smallest_fit(&self, min_bin: u32) -> Option<u32> {
        let min_top = min_bin >> TOP_BINS_INDEX_SHIFT;
        let min_leaf = min_bin & LEAF_BINS_INDEX_MASK;

        if self.used_top & (1 << min_top) != 0 {
            let leaf_mask = u32::from(self.used_leaf[min_top as usize]);
            if let Some(leaf) = lowest_set_bit_after(leaf_mask, min_leaf) {
                return Some((min_top << TOP_BINS_INDEX_SHIFT) | leaf);
            }
        }

        let top = lowest_set_bit_after(self.used_top, min_top + 1)?;
        let leaf = u32::from(self.used_leaf[top as usize]).trailing_zeros();
        Some((top << TOP_BINS_INDEX_SHIFT) | leaf)
    }

    /// Whether the occupancy bit for `bin` is set. Invariant-checker hook.
    #[cfg(any(debug_assertions, test))]
    #[allow(dead_code)]
    pub(crate) fn is_marked(&self, bin: u32) -> bool {
        let top = bin >> TOP_BINS_INDEX_SHIFT;
        let leaf = bin & LEAF_BINS_INDEX_MASK;
        self.used_leaf[top as usize] & (1 << leaf) != 0
    }

    /// Largest non-empty bin, or `None` when every bin is empty. Drives
    /// the largest-free-region estimate in the storage report.
    pub(crate) fn highest_used_bin(&self) -> Option<u32> {
        if self.used_top == 0 {
            return None;
        }
        let top = 31 - self.used_top.leading_zeros();
        // Top bit set implies a non-zero leaf mask.
        let leaf = 31 - u32::from(self.used_leaf[top as usize]).leading_zeros();
        Some((top << TOP_BINS_INDEX_SHIFT) | leaf)
    }
}
