use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Sub},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;

use crate::op;

const CURRENCY_SYMBOL: &str = "₹";

//--------------------------------------       Money        ----------------------------------------------------------
/// A monetary amount in whole currency units.
///
/// Order thresholds and pledges are always integral, so amounts are carried as plain `i64` all the way from the wire
/// through the ledger and the live cache. Keeps the arithmetic exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{CURRENCY_SYMBOL}{}", self.0)
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Money::from(40);
        let b = Money::from(70);
        assert_eq!(a + b, Money::from(110));
        assert_eq!(b - a, Money::from(30));
        let mut c = a;
        c += b;
        assert_eq!(c, Money::from(110));
        let total: Money = [a, b, Money::from(5)].into_iter().sum();
        assert_eq!(total, Money::from(115));
    }

    #[test]
    fn display_uses_currency_symbol() {
        assert_eq!(Money::from(150).to_string(), "₹150");
        assert!(Money::from(1).is_positive());
        assert!(!Money::from(0).is_positive());
    }
}
