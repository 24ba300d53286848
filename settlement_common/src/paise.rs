use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const CURRENCY_CODE: &str = "INR";
pub const CURRENCY_SYMBOL: &str = "₹";

//--------------------------------------        Paise          ---------------------------------------------------------
/// A signed amount of money in paise (1/100 of a rupee). All ledger and payout arithmetic is done in this unit so that
/// no floating point rounding ever touches a balance.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Paise(i64);

op!(binary Paise, Add, add);
op!(binary Paise, Sub, sub);
op!(inplace Paise, AddAssign, add_assign);
op!(inplace Paise, SubAssign, sub_assign);
op!(unary Paise, Neg, neg);

impl Sum for Paise {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in paise: {0}")]
pub struct PaiseConversionError(String);

impl From<i64> for Paise {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Paise {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Paise {}

impl TryFrom<u64> for Paise {
    type Error = PaiseConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Self)
            .map_err(|_| PaiseConversionError(format!("Value {value} is too large to convert to Paise")))
    }
}

impl Display for Paise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{CURRENCY_SYMBOL}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Paise {
    pub const ZERO: Paise = Paise(0);

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_rupees(rupees: i64) -> Self {
        Self(rupees * 100)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// The amount with the sign removed.
    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Returns the share of `self` that corresponds to `part / whole`, rounded half away from zero to the nearest
    /// paisa. A zero or negative `whole` yields a zero share.
    pub fn pro_rata(&self, part: Paise, whole: Paise) -> Paise {
        if whole.0 <= 0 {
            return Paise::ZERO;
        }
        let numerator = i128::from(self.0) * i128::from(part.0);
        let denominator = i128::from(whole.0);
        let half = denominator / 2;
        let rounded = if numerator >= 0 { (numerator + half) / denominator } else { (numerator - half) / denominator };
        Paise(i64::try_from(rounded).unwrap_or(if rounded > 0 { i64::MAX } else { i64::MIN }))
    }

    /// `self × rhs`, or `None` if the product does not fit in an `i64`.
    pub fn checked_mul(&self, rhs: i64) -> Option<Self> {
        self.0.checked_mul(rhs).map(Self)
    }

    /// `self × rhs`, clamped to the representable range.
    pub fn saturating_mul(&self, rhs: i64) -> Self {
        Self(self.0.saturating_mul(rhs))
    }

    /// The larger of `self` and zero.
    pub fn positive_part(&self) -> Self {
        Self(self.0.max(0))
    }
}
