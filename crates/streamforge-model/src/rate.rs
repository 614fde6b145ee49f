//! Processing rates and binding attributes.

use num_rational::Ratio;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ids::BindingId;

/// Non-negative rational used for rates, flows, and space bounds.
pub type Rational = Ratio<u64>;

/// `ceilUMulRate` = ⌈x·n/d⌉ — the rational-to-integer scaling operation
/// every item-count computation goes through.
pub fn ceil_u_mul_rate(x: u64, rate: Rational) -> u64 {
    let num = (x as u128) * (*rate.numer() as u128);
    let den = *rate.denom() as u128;
    ((num + den - 1) / den) as u64
}

/// A sentinel standing in for the unbounded upper bound a `Greedy` rate
/// carries. Kept separate from `Rational::MAX` so callers can branch on
/// "is this actually unbounded" without a magic-number comparison.
pub const UNBOUNDED: Rational = Ratio::new_raw(u64::MAX, 1);

pub fn is_unbounded(r: Rational) -> bool {
    r == UNBOUNDED
}

/// `ProcessingRate` variants. `r`, `lo`, `hi` are rationals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcessingRate {
    Fixed(Rational),
    Bounded(Rational, Rational),
    PartialSum(BindingId),
    Relative(BindingId, Rational),
    Greedy(Rational),
    Unknown,
}

impl ProcessingRate {
    /// Normalized (min, max) per-stride rate, independent of any
    /// reference binding's own bounds (those are resolved by the buffer
    /// graph, which knows the referenced port's min/max).
    pub fn self_bounds(&self) -> Option<(Rational, Rational)> {
        match *self {
            ProcessingRate::Fixed(r) => Some((r, r)),
            ProcessingRate::Bounded(lo, hi) => Some((lo, hi)),
            ProcessingRate::Greedy(lo) => Some((lo, UNBOUNDED)),
            ProcessingRate::PartialSum(_) | ProcessingRate::Relative(_, _) | ProcessingRate::Unknown => None,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, ProcessingRate::Fixed(_))
    }

    pub fn is_greedy(&self) -> bool {
        matches!(self, ProcessingRate::Greedy(_))
    }
}

/// Attribute kinds known to the compiler, stored as a fixed-size bitset
/// plus a side-table for the parameterized kinds (`Add(k)`, `BlockSize(k)`,
/// `LookAhead(k)`, `LookBehind(k)`, `RoundUpTo(k)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttributeKind {
    Add,
    Truncate,
    RoundUpTo,
    BlockSize,
    LookAhead,
    LookBehind,
    Deferred,
    Principal,
    ZeroExtended,
    ManagedBuffer,
    SharedManagedBuffer,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Attributes {
    flags: u16,
    params: HashMap<AttributeKind, u64>,
}

const fn bit(kind: AttributeKind) -> u16 {
    1 << (kind as u16)
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flag(mut self, kind: AttributeKind) -> Self {
        self.flags |= bit(kind);
        self
    }

    pub fn with_param(mut self, kind: AttributeKind, value: u64) -> Self {
        self.flags |= bit(kind);
        self.params.insert(kind, value);
        self
    }

    pub fn has(&self, kind: AttributeKind) -> bool {
        self.flags & bit(kind) != 0
    }

    pub fn param(&self, kind: AttributeKind) -> Option<u64> {
        self.params.get(&kind).copied()
    }

    pub fn add_k(&self) -> u64 {
        self.param(AttributeKind::Add).unwrap_or(0)
    }

    pub fn look_ahead_k(&self) -> u64 {
        self.param(AttributeKind::LookAhead).unwrap_or(0)
    }

    pub fn look_behind_k(&self) -> u64 {
        self.param(AttributeKind::LookBehind).unwrap_or(0)
    }

    pub fn round_up_to_k(&self) -> Option<u64> {
        self.param(AttributeKind::RoundUpTo)
    }

    pub fn block_size_k(&self) -> Option<u64> {
        self.param(AttributeKind::BlockSize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_u_mul_rate_rounds_up() {
        assert_eq!(ceil_u_mul_rate(7, Rational::new(1, 2)), 4);
        assert_eq!(ceil_u_mul_rate(8, Rational::new(1, 2)), 4);
        assert_eq!(ceil_u_mul_rate(1000, Rational::new(3, 1)), 3000);
    }

    #[test]
    fn attributes_round_trip() {
        let a = Attributes::new()
            .with_param(AttributeKind::Add, 4)
            .with_flag(AttributeKind::Deferred);
        assert_eq!(a.add_k(), 4);
        assert!(a.has(AttributeKind::Deferred));
        assert!(!a.has(AttributeKind::Principal));
    }

    #[test]
    fn fixed_rate_self_bounds() {
        let r = ProcessingRate::Fixed(Rational::new(2, 1));
        assert_eq!(r.self_bounds(), Some((Rational::new(2, 1), Rational::new(2, 1))));
    }
}
