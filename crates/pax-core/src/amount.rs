//! # Monetary Amounts
//!
//! [`Amount`] is an indivisible count of base units: one marketplace unit
//! is `10^18` base units. All fee, reward, and slash math happens on the
//! integer base-unit representation with checked (or provably
//! non-overflowing) arithmetic.
//!
//! ## Security Invariant
//!
//! Monetary values are never represented as floating-point numbers, and
//! no arithmetic path may silently wrap. Fractions of an amount are
//! expressed in basis points (1 bp = 0.01%) and computed with flooring
//! integer division; callers that split an amount are responsible for
//! routing the division remainder somewhere explicit.

use serde::{Deserialize, Serialize};

/// Base units per marketplace unit.
pub const UNIT_BASE: u128 = 1_000_000_000_000_000_000;

/// Basis points in a whole (100%).
pub const BPS_DENOMINATOR: u128 = 10_000;

/// A monetary amount in base units.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u128);

impl Amount {
    /// The zero amount.
    pub const ZERO: Amount = Amount(0);

    /// One marketplace unit.
    pub const UNIT: Amount = Amount(UNIT_BASE);

    /// Create an amount from raw base units.
    pub const fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    /// Create an amount from whole marketplace units.
    pub const fn from_units(units: u64) -> Self {
        Self(units as u128 * UNIT_BASE)
    }

    /// Create an amount from thousandths of a unit (0.001 granularity).
    pub const fn from_milli_units(milli: u64) -> Self {
        Self(milli as u128 * (UNIT_BASE / 1_000))
    }

    /// The raw base-unit count.
    pub const fn base_units(&self) -> u128 {
        self.0
    }

    /// Whether this amount is zero.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Saturating addition. Used for attributed totals whose true bound
    /// is enforced elsewhere (the ledger rejects overflowing balances).
    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction. Used where the result is a best-effort
    /// residual, never where conservation matters.
    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// The given fraction of this amount, in basis points, floored.
    ///
    /// Computed as `q * bps + (r * bps) / 10_000` where `self = q * 10_000
    /// + r`, which is exact and cannot overflow for any `bps <= 10_000`.
    pub fn bps(self, basis_points: u32) -> Amount {
        let bps = basis_points as u128;
        let q = self.0 / BPS_DENOMINATOR;
        let r = self.0 % BPS_DENOMINATOR;
        Amount(q * bps + r * bps / BPS_DENOMINATOR)
    }

    /// Divide this amount into `parts` equal shares, returning the share
    /// and the remainder that does not divide evenly.
    pub fn split(self, parts: u64) -> (Amount, Amount) {
        if parts == 0 {
            return (Amount::ZERO, self);
        }
        let share = self.0 / parts as u128;
        let remainder = self.0 - share * parts as u128;
        (Amount(share), Amount(remainder))
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / UNIT_BASE;
        let frac = self.0 % UNIT_BASE;
        if frac == 0 {
            write!(f, "{whole}")
        } else {
            let digits = format!("{frac:018}");
            write!(f, "{whole}.{}", digits.trim_end_matches('0'))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unit_constructors_agree() {
        assert_eq!(Amount::from_units(1), Amount::UNIT);
        assert_eq!(Amount::from_milli_units(1_000), Amount::UNIT);
        assert_eq!(
            Amount::from_milli_units(1),
            Amount::from_base_units(UNIT_BASE / 1_000)
        );
    }

    #[test]
    fn protocol_fee_worked_example() {
        // 1.5% of 1 unit is 0.015; funded total is 1.015.
        let amount = Amount::from_units(1);
        let fee = amount.bps(150);
        assert_eq!(fee, Amount::from_milli_units(15));
        assert_eq!(
            amount.checked_add(fee).unwrap(),
            Amount::from_milli_units(1_015)
        );
    }

    #[test]
    fn reward_pool_worked_example() {
        // 0.5% of 1 unit splits among 3 voters with remainder 1 base unit.
        let pool = Amount::from_units(1).bps(50);
        assert_eq!(pool, Amount::from_milli_units(5));
        let (share, remainder) = pool.split(3);
        assert_eq!(
            share.checked_add(share)
                .and_then(|s| s.checked_add(share))
                .and_then(|s| s.checked_add(remainder))
                .unwrap(),
            pool
        );
        assert!(remainder < Amount::from_base_units(3));
    }

    #[test]
    fn bps_of_full_denominator_is_identity() {
        let amount = Amount::from_base_units(123_456_789_012_345);
        assert_eq!(amount.bps(10_000), amount);
        assert_eq!(amount.bps(0), Amount::ZERO);
    }

    #[test]
    fn checked_sub_underflow_is_none() {
        assert!(Amount::ZERO.checked_sub(Amount::UNIT).is_none());
        assert_eq!(
            Amount::UNIT.checked_sub(Amount::UNIT),
            Some(Amount::ZERO)
        );
    }

    #[test]
    fn split_zero_parts_returns_all_as_remainder() {
        let amount = Amount::from_units(7);
        let (share, remainder) = amount.split(0);
        assert_eq!(share, Amount::ZERO);
        assert_eq!(remainder, amount);
    }

    #[test]
    fn display_trims_trailing_zeros() {
        assert_eq!(Amount::from_units(2).to_string(), "2");
        assert_eq!(Amount::from_milli_units(1_015).to_string(), "1.015");
        assert_eq!(Amount::from_base_units(1).to_string(), "0.000000000000000001");
    }

    #[test]
    fn serde_is_transparent() {
        let amount = Amount::from_milli_units(1_015);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "1015000000000000000");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }

    proptest! {
        #[test]
        fn bps_never_exceeds_amount(units in 0u128..=u128::MAX / 2, bp in 0u32..=10_000) {
            let amount = Amount::from_base_units(units);
            prop_assert!(amount.bps(bp) <= amount);
        }

        #[test]
        fn bps_matches_naive_math_for_small_amounts(units in 0u128..=u64::MAX as u128, bp in 0u32..=10_000) {
            let amount = Amount::from_base_units(units);
            let naive = units * bp as u128 / BPS_DENOMINATOR;
            prop_assert_eq!(amount.bps(bp).base_units(), naive);
        }

        #[test]
        fn split_conserves_value(units in 0u128..=u64::MAX as u128, parts in 1u64..=64) {
            let amount = Amount::from_base_units(units);
            let (share, remainder) = amount.split(parts);
            let total = share.base_units() * parts as u128 + remainder.base_units();
            prop_assert_eq!(total, amount.base_units());
            prop_assert!(remainder.base_units() < parts as u128);
        }
    }
}
