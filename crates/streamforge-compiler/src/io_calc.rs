//! I/O calculation.
//!
//! Plain arithmetic over item counts; the segment compiler calls these
//! while lowering `calculate-item-counts`. All item counts are 64-bit
//! unsigned; the sentinel [`INFINITE`] stands in for "closed and
//! exhausted zero-extendable input" rather than using a real overflow.

use streamforge_model::{ceil_u_mul_rate, Rational};

use crate::error::{CompilerError, Result};

pub const INFINITE: u64 = u64::MAX;

/// `accessibleInputItems` = `linearlyAccessible(buffer, processed, available, lookAhead)`.
/// A zero-extendable input that is closed and fully consumed reports
/// [`INFINITE`] so the caller's `min` over ports never lets it bound the
/// stride count.
pub fn accessible_input_items(
    processed: u64,
    available: u64,
    look_ahead: u64,
    zero_extended_closed_exhausted: bool,
) -> u64 {
    if zero_extended_closed_exhausted {
        return INFINITE;
    }
    available.saturating_sub(processed).saturating_add(look_ahead)
}

/// `writableOutputItems` = `linearlyWritable(buffer, produced, consumed, copyBackHeadroom)`:
/// the remaining room in `capacity` not already holding unconsumed
/// (in-flight) items, plus the stream-set's copy-back overflow region.
pub fn writable_output_items(produced: u64, consumed: u64, capacity: u64, copy_back_headroom: u64) -> u64 {
    let in_flight = produced.saturating_sub(consumed);
    capacity.saturating_sub(in_flight).saturating_add(copy_back_headroom)
}

/// `numOfAccessibleStrides(input)` for a `Fixed`/`Bounded` port:
/// `accessible / strideLength`.
pub fn num_accessible_strides_fixed(accessible: u64, stride_length: u64) -> u64 {
    if stride_length == 0 {
        return INFINITE;
    }
    accessible / stride_length
}

/// `numOfAccessibleStrides(input)` for a `PartialSum` port: binary-search
/// the reference kernel's prefix-sum stream for the largest `k` with
/// `prefix_sums[k] <= accessible`. `prefix_sums` must be monotonically
/// non-decreasing (enforced when assertions are on).
pub fn num_accessible_strides_partial_sum(
    binding: streamforge_model::BindingId,
    accessible: u64,
    prefix_sums: &[u64],
    assert_enabled: bool,
) -> Result<u64> {
    if assert_enabled {
        for w in prefix_sums.windows(2) {
            if w[1] < w[0] {
                return Err(CompilerError::NonMonotonicPartialSum(binding));
            }
        }
    }
    let mut lo = 0usize;
    let mut hi = prefix_sums.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if prefix_sums[mid] <= accessible {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok(lo as u64)
}

/// One port's resolved item count, scaled by its rate's ratio to the
/// partition's LCM stride, honoring `Add`/`Truncate`/`RoundUpTo` on
/// closure, in that tie-break order.
#[derive(Debug, Clone, Copy)]
pub struct FinalCountInputs {
    pub rate_to_lcm: Rational,
    pub add_k: u64,
    pub truncate_k: Option<u64>,
    pub round_up_to_k: Option<u64>,
}

/// `finalItemCounts`: scale `min_fixed_rate_stride` (the minimum
/// fixed-rate-normalized factor across inputs, computed by the caller)
/// by this port's rate-to-LCM ratio, then apply `Add`/`Truncate`/`RoundUpTo`.
pub fn final_item_count(min_fixed_rate_stride: u64, port: &FinalCountInputs) -> u64 {
    let scaled = ceil_u_mul_rate(min_fixed_rate_stride, port.rate_to_lcm);
    let with_add = scaled.saturating_add(port.add_k);
    let truncated = match port.truncate_k {
        Some(t) => with_add.min(t),
        None => with_add,
    };
    match port.round_up_to_k {
        Some(k) if k > 0 => truncated.div_ceil(k) * k,
        _ => truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_extended_closed_exhausted_is_infinite() {
        assert_eq!(accessible_input_items(10, 10, 0, true), INFINITE);
    }

    #[test]
    fn accessible_items_adds_look_ahead() {
        assert_eq!(accessible_input_items(4, 10, 2, false), 8);
    }

    #[test]
    fn writable_items_subtracts_in_flight_adds_headroom() {
        assert_eq!(writable_output_items(12, 4, 20, 3), 15);
    }

    #[test]
    fn fixed_strides_divide_evenly() {
        assert_eq!(num_accessible_strides_fixed(17, 4), 4);
        assert_eq!(num_accessible_strides_fixed(0, 0), INFINITE);
    }

    #[test]
    fn partial_sum_binary_search_finds_largest_fitting_prefix() {
        let sums = vec![2, 5, 9, 14, 20];
        let b = streamforge_model::BindingId(0);
        assert_eq!(num_accessible_strides_partial_sum(b, 9, &sums, true).unwrap(), 3);
        assert_eq!(num_accessible_strides_partial_sum(b, 1, &sums, true).unwrap(), 0);
        assert_eq!(num_accessible_strides_partial_sum(b, 100, &sums, true).unwrap(), 5);
    }

    #[test]
    fn non_monotonic_partial_sum_is_rejected_when_asserting() {
        let sums = vec![5, 3, 9];
        let b = streamforge_model::BindingId(0);
        assert!(num_accessible_strides_partial_sum(b, 4, &sums, true).is_err());
        assert!(num_accessible_strides_partial_sum(b, 4, &sums, false).is_ok());
    }

    #[test]
    fn final_item_count_applies_round_up_to() {
        let port = FinalCountInputs { rate_to_lcm: Rational::new(1, 1), add_k: 1, truncate_k: None, round_up_to_k: Some(4) };
        assert_eq!(final_item_count(5, &port), 8);
    }
}
