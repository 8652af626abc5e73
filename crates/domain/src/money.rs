//! Amounts of money in the currency's minor unit (paise, cents).

use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// An amount in minor units.
///
/// Amounts carry no currency; the currency lives on the payment intent. Ledger
/// balances never go negative, but intermediate differences may, so the
/// representation is signed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Price of `quantity` units at this unit price.
    pub fn times(self, quantity: u32) -> Money {
        Money(self.0 * i64::from(quantity))
    }

    /// How much of this amount `funds` can pay for.
    ///
    /// Never more than the amount itself and never negative, so a wallet
    /// balance run through here is always a valid debit.
    pub fn covered_by(self, funds: Money) -> Money {
        Money(funds.0.clamp(0, self.0.max(0)))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! money_op {
    ($op:ident, $method:ident, $assign:ident, $assign_method:ident, $sym:tt) => {
        impl $op for Money {
            type Output = Money;

            fn $method(self, rhs: Money) -> Money {
                Money(self.0 $sym rhs.0)
            }
        }

        impl $assign for Money {
            fn $assign_method(&mut self, rhs: Money) {
                *self = *self $sym rhs;
            }
        }
    };
}

money_op!(Add, add, AddAssign, add_assign, +);
money_op!(Sub, sub, SubAssign, sub_assign, -);

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        Money(iter.map(|m| m.0).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_totals() {
        let unit = Money::from_minor(1_000);
        assert_eq!(unit.times(3), Money::from_minor(3_000));
        assert_eq!(unit.times(0), Money::zero());
    }

    #[test]
    fn test_covered_by_caps_at_amount() {
        let gross = Money::from_minor(1_050);
        assert_eq!(gross.covered_by(Money::from_minor(200)), Money::from_minor(200));
        assert_eq!(gross.covered_by(Money::from_minor(5_000)), gross);
        assert_eq!(gross.covered_by(Money::zero()), Money::zero());
        assert_eq!(gross.covered_by(Money::from_minor(-10)), Money::zero());
    }

    #[test]
    fn test_residual_after_wallet() {
        let gross: Money = [1_000, 50].into_iter().map(Money::from_minor).sum();
        let mut due = gross;
        due -= gross.covered_by(Money::from_minor(200));
        assert_eq!(due, Money::from_minor(850));
        assert!((due - gross).is_negative());
    }

    #[test]
    fn test_serializes_as_minor_units() {
        assert_eq!(serde_json::to_string(&Money::from_minor(850)).unwrap(), "850");
        assert_eq!(Money::from_minor(850).to_string(), "850");
        let parsed: Money = serde_json::from_str("1050").unwrap();
        assert_eq!(parsed, Money::from_minor(1_050));
    }
}
