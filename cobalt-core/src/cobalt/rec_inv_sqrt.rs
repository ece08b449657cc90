//! Fixed-point estimate of `1/sqrt(count)`.
//!
//! The value is a Q0.32 fraction: the full `u32` mantissa scaled by 2^32. It is refined
//! one Newton iteration at a time as `count` moves by one, so the delay controller never
//! needs a division or a square root on the packet path.
//!
//! Newton's method for the reciprocal square root:
//! `new_invsqrt = (invsqrt / 2) * (3 - count * invsqrt^2)`

use once_cell::sync::Lazy;

/// Number of leading `count` values served from the precomputed table.
pub const REC_INV_SQRT_CACHE: usize = 16;

/// Iterations spent per table slot, starting from the previous slot's value.
const CACHE_NEWTON_ITERATIONS: usize = 4;

/// Built on first use from any queue, then read-only for the life of the process.
static REC_INV_SQRT_TABLE: Lazy<[u32; REC_INV_SQRT_CACHE]> = Lazy::new(build_cache);

fn build_cache() -> [u32; REC_INV_SQRT_CACHE] {
    let mut cache = [0u32; REC_INV_SQRT_CACHE];
    // 1/sqrt(0) is infinite, clamp to the largest fraction we can hold
    let mut rec_inv_sqrt = u32::MAX;
    cache[0] = rec_inv_sqrt;

    for (count, slot) in cache.iter_mut().enumerate().skip(1) {
        for _ in 0..CACHE_NEWTON_ITERATIONS {
            rec_inv_sqrt = newton_step(count as u32, rec_inv_sqrt);
        }
        *slot = rec_inv_sqrt;
    }
    cache
}

/// One raw Newton iteration, never consulting the table.
pub fn newton_step(count: u32, rec_inv_sqrt: u32) -> u32 {
    let invsqrt = rec_inv_sqrt as u64;
    let invsqrt2 = (invsqrt * invsqrt) >> 32;
    // count * invsqrt2 stays below 3.0 in Q32.32 while the estimate tracks count,
    // an estimate far too large for count collapses to zero instead of wrapping
    let val = (3u64 << 32).saturating_sub(count as u64 * invsqrt2);

    // pre-shift by two so the multiply below fits in 64 bits
    let val = ((val >> 2) * invsqrt) >> (32 - 2 + 1);
    u32::try_from(val).unwrap_or(u32::MAX)
}

/// Estimate of `1/sqrt(count)` given the estimate for a neighbouring `count`.
pub fn rec_inv_sqrt(count: u32, previous: u32) -> u32 {
    match REC_INV_SQRT_TABLE.get(count as usize) {
        Some(cached) => *cached,
        None => newton_step(count, previous),
    }
}

/// The precomputed table, forcing its construction if nobody has yet.
pub fn cache() -> &'static [u32; REC_INV_SQRT_CACHE] {
    &REC_INV_SQRT_TABLE
}
