//! Wrapped half-open integer intervals.
//!
//! A [`ConstantRange`] describes a set of `bits` wide integers as
//! `[lower, upper)`. The interval may wrap around the end of the unsigned
//! space, in which case `lower > upper`. `lower == upper` only encodes the
//! empty set (both zero) or the full set (both all ones).
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstantRange {
    bits: u32,
    lower: u64,
    upper: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowResult {
    AlwaysOverflowsLow,
    AlwaysOverflowsHigh,
    MayOverflow,
    NeverOverflows,
}

/// Tie breaker used by [`ConstantRange::union_with`] when the exact union is
/// not representable and two candidates exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredRangeType {
    Smallest,
    /// Prefer a candidate that doesn't wrap in the signed domain.
    Signed,
}

impl ConstantRange {
    pub fn full(bits: u32) -> Self {
        debug_assert!((1..=64).contains(&bits));
        let mask = mask(bits);
        Self::raw(bits, mask, mask)
    }

    pub fn empty(bits: u32) -> Self {
        debug_assert!((1..=64).contains(&bits));
        Self::raw(bits, 0, 0)
    }

    /// Makes `[lower, upper)` from raw bit patterns. Equal bounds other than
    /// the empty encoding are treated as the full set.
    pub fn new(bits: u32, lower: u64, upper: u64) -> Self {
        let mask = mask(bits);
        let (lower, upper) = (lower & mask, upper & mask);
        if lower == upper {
            debug_assert!(lower == 0 || lower == mask);
            return if lower == 0 {
                Self::empty(bits)
            } else {
                Self::full(bits)
            };
        }
        Self::raw(bits, lower, upper)
    }

    pub fn singleton(bits: u32, value: i64) -> Self {
        let mask = mask(bits);
        let value = value as u64;
        Self::raw(bits, value & mask, value.wrapping_add(1) & mask)
    }

    /// Makes the half-open signed interval `[lower, upper)`.
    pub fn from_signed(bits: u32, lower: i64, upper: i64) -> Self {
        if lower == upper {
            return Self::empty(bits);
        }
        let mask = mask(bits);
        let (lower, upper) = (lower as u64 & mask, upper as u64 & mask);
        if lower == upper {
            Self::full(bits)
        } else {
            Self::raw(bits, lower, upper)
        }
    }

    /// Makes the closed signed interval `[min, max]`.
    pub fn from_signed_inclusive(bits: u32, min: i64, max: i64) -> Self {
        debug_assert!(min <= max);
        if min == signed_min_value(bits) && max == signed_max_value(bits) {
            return Self::full(bits);
        }
        let mask = mask(bits);
        Self::raw(bits, min as u64 & mask, (max as u64).wrapping_add(1) & mask)
    }

    /// Same as [`Self::from_signed_inclusive`], but bounds that don't fit in
    /// `bits` give the full set.
    pub fn from_signed_bounds(bits: u32, min: i128, max: i128) -> Self {
        debug_assert!(min <= max);
        if min < signed_min_value(bits) as i128 || max > signed_max_value(bits) as i128 {
            Self::full(bits)
        } else {
            Self::from_signed_inclusive(bits, min as i64, max as i64)
        }
    }

    fn raw(bits: u32, lower: u64, upper: u64) -> Self {
        Self { bits, lower, upper }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn lower(&self) -> u64 {
        self.lower
    }

    pub fn upper(&self) -> u64 {
        self.upper
    }

    pub fn signed_lower(&self) -> i64 {
        self.sext(self.lower)
    }

    pub fn signed_upper(&self) -> i64 {
        self.sext(self.upper)
    }

    pub fn is_full(&self) -> bool {
        self.lower == self.upper && self.lower == mask(self.bits)
    }

    pub fn is_empty(&self) -> bool {
        self.lower == self.upper && self.lower == 0
    }

    /// Returns `true` if the interval wraps in the unsigned domain, counting
    /// `[x, 0)` as wrapped.
    pub fn is_upper_wrapped(&self) -> bool {
        self.lower > self.upper
    }

    /// Returns `true` if the interval wraps in the signed domain, counting
    /// `[x, SMIN)` as wrapped.
    pub fn is_upper_sign_wrapped(&self) -> bool {
        self.signed_lower() > self.signed_upper()
    }

    pub fn is_sign_wrapped_set(&self) -> bool {
        self.is_upper_sign_wrapped() && self.upper != signed_min_bits(self.bits)
    }

    pub fn signed_min(&self) -> i64 {
        if self.is_full() || self.is_sign_wrapped_set() {
            signed_min_value(self.bits)
        } else {
            self.signed_lower()
        }
    }

    pub fn signed_max(&self) -> i64 {
        if self.is_full() || self.is_upper_sign_wrapped() {
            signed_max_value(self.bits)
        } else {
            self.sext(self.upper.wrapping_sub(1) & mask(self.bits))
        }
    }

    /// Number of elements in the set.
    pub fn size(&self) -> u128 {
        if self.is_full() {
            1u128 << self.bits
        } else {
            (self.upper.wrapping_sub(self.lower) & mask(self.bits)) as u128
        }
    }

    fn is_size_strictly_smaller_than(&self, other: &Self) -> bool {
        if self.is_full() {
            return false;
        }
        if other.is_full() {
            return true;
        }
        let mask = mask(self.bits);
        (self.upper.wrapping_sub(self.lower) & mask) < (other.upper.wrapping_sub(other.lower) & mask)
    }

    /// Returns `true` if every element of `other` is in `self`.
    pub fn contains(&self, other: &Self) -> bool {
        debug_assert_eq!(self.bits, other.bits);
        if self.is_full() || other.is_empty() {
            return true;
        }
        if self.is_empty() || other.is_full() {
            return false;
        }

        if !self.is_upper_wrapped() {
            if other.is_upper_wrapped() {
                return false;
            }
            return self.lower <= other.lower && other.upper <= self.upper;
        }

        if !other.is_upper_wrapped() {
            return other.upper <= self.upper || self.lower <= other.lower;
        }
        other.upper <= self.upper && self.lower <= other.lower
    }

    /// Returns the smallest interval containing both `self` and `other`. If
    /// two such intervals exist, `ty` decides.
    pub fn union_with(&self, other: &Self, ty: PreferredRangeType) -> Self {
        debug_assert_eq!(self.bits, other.bits);
        let bits = self.bits;
        if self.is_empty() || other.is_full() {
            return *other;
        }
        if other.is_empty() || self.is_full() {
            return *self;
        }

        if !self.is_upper_wrapped() && other.is_upper_wrapped() {
            return other.union_with(self, ty);
        }

        if !self.is_upper_wrapped() && !other.is_upper_wrapped() {
            // Disjoint: either fill the gap in between or wrap around.
            if other.upper < self.lower || self.upper < other.lower {
                return preferred_range(
                    Self::raw(bits, self.lower, other.upper),
                    Self::raw(bits, other.lower, self.upper),
                    ty,
                );
            }

            let lower = self.lower.min(other.lower);
            let mask = mask(bits);
            let upper = if other.upper.wrapping_sub(1) & mask > self.upper.wrapping_sub(1) & mask {
                other.upper
            } else {
                self.upper
            };
            if lower == 0 && upper == 0 {
                return Self::full(bits);
            }
            return Self::raw(bits, lower, upper);
        }

        if !other.is_upper_wrapped() {
            // `other` lies inside one of the two pieces of `self`.
            if other.upper <= self.upper || other.lower >= self.lower {
                return *self;
            }
            // `other` bridges the hole of `self`.
            if other.lower <= self.upper && self.lower <= other.upper {
                return Self::full(bits);
            }
            // `other` lies inside the hole of `self`.
            if self.upper < other.lower && other.upper < self.lower {
                return preferred_range(
                    Self::raw(bits, self.lower, other.upper),
                    Self::raw(bits, other.lower, self.upper),
                    ty,
                );
            }
            if self.upper < other.lower && self.lower <= other.upper {
                return Self::raw(bits, other.lower, self.upper);
            }
            debug_assert!(other.lower <= self.upper && other.upper < self.lower);
            return Self::raw(bits, self.lower, other.upper);
        }

        // Both wrap.
        if other.lower <= self.upper || self.lower <= other.upper {
            return Self::full(bits);
        }
        let lower = self.lower.min(other.lower);
        let upper = self.upper.max(other.upper);
        Self::raw(bits, lower, upper)
    }

    /// Returns a superset of `{a + b | a in self, b in other}` computed with
    /// wrapping arithmetic.
    pub fn add(&self, other: &Self) -> Self {
        debug_assert_eq!(self.bits, other.bits);
        let bits = self.bits;
        if self.is_empty() || other.is_empty() {
            return Self::empty(bits);
        }
        if self.is_full() || other.is_full() {
            return Self::full(bits);
        }

        let mask = mask(bits);
        let lower = self.lower.wrapping_add(other.lower) & mask;
        let upper = self
            .upper
            .wrapping_add(other.upper)
            .wrapping_sub(1)
            & mask;
        if lower == upper {
            return Self::full(bits);
        }

        let sum = Self::raw(bits, lower, upper);
        if sum.is_size_strictly_smaller_than(self) || sum.is_size_strictly_smaller_than(other) {
            // The sum wrapped around.
            return Self::full(bits);
        }
        sum
    }

    pub fn signed_add_may_overflow(&self, other: &Self) -> OverflowResult {
        if self.is_empty() || other.is_empty() {
            return OverflowResult::MayOverflow;
        }

        let smin = signed_min_value(self.bits) as i128;
        let smax = signed_max_value(self.bits) as i128;
        let (min, max) = (self.signed_min() as i128, self.signed_max() as i128);
        let (other_min, other_max) = (other.signed_min() as i128, other.signed_max() as i128);

        if min >= 0 && other_min >= 0 && min > smax - other_min {
            return OverflowResult::AlwaysOverflowsHigh;
        }
        if max < 0 && other_max < 0 && max < smin - other_max {
            return OverflowResult::AlwaysOverflowsLow;
        }
        if max >= 0 && other_max >= 0 && max > smax - other_max {
            return OverflowResult::MayOverflow;
        }
        if min < 0 && other_min < 0 && min < smin - other_min {
            return OverflowResult::MayOverflow;
        }
        OverflowResult::NeverOverflows
    }

    /// Scales every element by `factor`. Products that leave the signed
    /// domain give the full set.
    pub fn multiply_by(&self, factor: i64) -> Self {
        if self.is_empty() {
            return *self;
        }
        let a = self.signed_min() as i128 * factor as i128;
        let b = self.signed_max() as i128 * factor as i128;
        Self::from_signed_bounds(self.bits, a.min(b), a.max(b))
    }

    pub fn sext_or_trunc(&self, bits: u32) -> Self {
        match self.bits.cmp(&bits) {
            std::cmp::Ordering::Less => self.sign_extend(bits),
            std::cmp::Ordering::Greater => self.truncate(bits),
            std::cmp::Ordering::Equal => *self,
        }
    }

    pub fn zext_or_trunc(&self, bits: u32) -> Self {
        match self.bits.cmp(&bits) {
            std::cmp::Ordering::Less => self.zero_extend(bits),
            std::cmp::Ordering::Greater => self.truncate(bits),
            std::cmp::Ordering::Equal => *self,
        }
    }

    fn sign_extend(&self, bits: u32) -> Self {
        if self.is_empty() {
            return Self::empty(bits);
        }
        Self::from_signed_inclusive(bits, self.signed_min(), self.signed_max())
    }

    fn zero_extend(&self, bits: u32) -> Self {
        if self.is_empty() {
            return Self::empty(bits);
        }
        if self.is_full() || self.is_upper_wrapped() {
            // `[x, 0)` only wraps to the top of the narrow type.
            let lower = if self.upper == 0 { self.lower } else { 0 };
            return Self::raw(bits, lower, 1u64 << self.bits);
        }
        Self::raw(bits, self.lower, self.upper)
    }

    /// Truncation keeps the interval only when it fits in the narrower type,
    /// either as an unsigned or as a signed interval.
    fn truncate(&self, bits: u32) -> Self {
        if self.is_empty() {
            return Self::empty(bits);
        }
        if self.is_full() {
            return Self::full(bits);
        }
        if !self.is_upper_wrapped() && self.upper <= mask(bits) {
            return Self::raw(bits, self.lower, self.upper);
        }

        let (min, max) = (self.signed_min(), self.signed_max());
        if min >= signed_min_value(bits) && max <= signed_max_value(bits) {
            Self::from_signed_inclusive(bits, min, max)
        } else {
            Self::full(bits)
        }
    }

    fn sext(&self, value: u64) -> i64 {
        let shift = 64 - self.bits;
        ((value << shift) as i64) >> shift
    }
}

impl fmt::Display for ConstantRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_full() {
            write!(f, "full-set")
        } else if self.is_empty() {
            write!(f, "empty-set")
        } else {
            write!(f, "[{},{})", self.signed_lower(), self.signed_upper())
        }
    }
}

/// Returns `true` if the range carries no usable bound: nothing observed,
/// everything possible, or a set that wraps in the signed domain.
pub fn is_unsafe(range: &ConstantRange) -> bool {
    range.is_empty() || range.is_full() || range.is_upper_sign_wrapped()
}

/// Adds two ranges, giving the full set unless the signed sum provably never
/// overflows. Adding an empty range yields the empty range.
pub fn add_overflow_never(lhs: &ConstantRange, rhs: &ConstantRange) -> ConstantRange {
    if lhs.is_empty() || rhs.is_empty() {
        return ConstantRange::empty(lhs.bits());
    }
    if lhs.signed_add_may_overflow(rhs) != OverflowResult::NeverOverflows {
        return ConstantRange::full(lhs.bits());
    }
    lhs.add(rhs)
}

fn preferred_range(
    cr1: ConstantRange,
    cr2: ConstantRange,
    ty: PreferredRangeType,
) -> ConstantRange {
    if ty == PreferredRangeType::Signed {
        match (cr1.is_sign_wrapped_set(), cr2.is_sign_wrapped_set()) {
            (false, true) => return cr1,
            (true, false) => return cr2,
            _ => {}
        }
    }

    if cr2.is_size_strictly_smaller_than(&cr1) {
        cr2
    } else {
        cr1
    }
}

fn mask(bits: u32) -> u64 {
    if bits == 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

fn signed_min_bits(bits: u32) -> u64 {
    1u64 << (bits - 1)
}

pub(crate) fn signed_min_value(bits: u32) -> i64 {
    if bits == 64 {
        i64::MIN
    } else {
        -(1i64 << (bits - 1))
    }
}

pub(crate) fn signed_max_value(bits: u32) -> i64 {
    if bits == 64 {
        i64::MAX
    } else {
        (1i64 << (bits - 1)) - 1
    }
}
