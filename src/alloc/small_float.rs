//! Logarithmic size-class codec.
//!
//! A byte size is mapped onto an 8-bit bin index laid out like a tiny
//! floating point number: 3 mantissa bits and a 5-bit exponent,
//! `(exponent << 3) | mantissa`. Sizes below 8 are "denormal" and encode
//! verbatim (lossless); larger sizes keep their top 3 bits after the
//! leading one, so each bin covers a range of at most 1/8 relative width.
//!
//! Two encoders exist because the allocator needs opposite rounding
//! guarantees:
//! - round **up** for allocation requests, so the chosen bin's minimum
//!   representable size is >= the request;
//! - round **down** for filing free regions, so a bin's nominal size is
//!   <= every region stored in it.

pub(crate) const MANTISSA_BITS: u32 = 3;
pub(crate) const MANTISSA_VALUE: u32 = 1 << MANTISSA_BITS;
pub(crate) const MANTISSA_MASK: u32 = MANTISSA_VALUE - 1;

/// Encode `size` into the smallest bin whose minimum size is >= `size`.
#[inline]
pub(crate) fn to_bin_round_up(size: u32) -> u32 {
    if size < MANTISSA_VALUE {
        return size;
    }

    let highest_set_bit = 31 - size.leading_zeros();
    let mantissa_start_bit = highest_set_bit - MANTISSA_BITS;
    let exp = mantissa_start_bit + 1;
    let mut mantissa = (size >> mantissa_start_bit) & MANTISSA_MASK;

    // Low bits lost by truncation force a round up. The add may push the
    // mantissa to 8, which carries into the exponent through the `+` below.
    let low_bits_mask = (1u32 << mantissa_start_bit) - 1;
    if size & low_bits_mask != 0 {
        mantissa += 1;
    }

    (exp << MANTISSA_BITS) + mantissa
}

/// Encode `size` into the largest bin whose minimum size is <= `size`.
#[inline]
pub(crate) fn to_bin_round_down(size: u32) -> u32 {
    if size < MANTISSA_VALUE {
        return size;
    }

    let highest_set_bit = 31 - size.leading_zeros();
    let mantissa_start_bit = highest_set_bit - MANTISSA_BITS;
    let exp = mantissa_start_bit + 1;
    let mantissa = (size >> mantissa_start_bit) & MANTISSA_MASK;

    (exp << MANTISSA_BITS) | mantissa
}

/// Decode a bin index back to the minimum size representable by that bin.
///
/// Bins >= 240 would decode past 32 bits; the shift wraps there. Encoding
/// a `u32` size never produces such a bin (max is 239), so wrapped values
/// only show up as nominal sizes of permanently empty report rows.
#[inline]
pub(crate) fn bin_to_size(bin: u32) -> u32 {
    let exp = bin >> MANTISSA_BITS;
    let mantissa = bin & MANTISSA_MASK;
    if exp == 0 {
        mantissa
    } else {
        (mantissa | MANTISSA_VALUE).wrapping_shl(exp - 1)
    }
}
