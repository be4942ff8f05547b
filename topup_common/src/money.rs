use std::{
    fmt::Display,
    iter::Sum,
    str::FromStr,
};

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{de, de::Visitor, Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY_CODE: &str = "RUB";
/// The number of fractional digits carried by every [`Money`] value.
pub const MONEY_SCALE: u32 = 2;

//--------------------------------------        Money        ---------------------------------------------------------
/// A fixed-point monetary amount with exactly two fractional digits.
///
/// The value is held as a whole number of minor units (kopecks, cents), so `Money::from_minor_units(150000)` is
/// `1500.00`. Storing an integer lets the database apply balance changes with atomic `balance = balance + ?` updates,
/// while all user-facing conversions go through [`Decimal`] so that no floating point arithmetic is ever involved.
///
/// `Money` serializes as a decimal string (`"1500.00"`), which is also the wire format the payment gateway expects.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

/// Saturates at the representable bounds. Use [`Money::checked_add`] where an overflow must be reported.
impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Money::saturating_add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct MoneyConversionError(String);

impl Money {
    pub const fn from_minor_units(value: i64) -> Self {
        Self(value)
    }

    pub fn from_whole_units(value: i64) -> Self {
        Self(value * 100)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    /// The amount in minor units
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, MONEY_SCALE)
    }

    /// Exact conversion from a decimal. Values with more than two significant fractional digits are rejected
    /// rather than rounded.
    pub fn try_from_decimal(value: Decimal) -> Result<Self, MoneyConversionError> {
        if value.normalize().scale() > MONEY_SCALE {
            return Err(MoneyConversionError(format!("{value} has more than {MONEY_SCALE} decimal places")));
        }
        value
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|v| v.to_i64())
            .map(Self)
            .ok_or_else(|| MoneyConversionError(format!("{value} is out of range")))
    }

    /// Rounds `value` to two decimal places (midpoint away from zero) and converts it.
    pub fn from_decimal_rounded(value: Decimal) -> Result<Self, MoneyConversionError> {
        let rounded = value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
        Self::try_from_decimal(rounded)
    }

    /// Calculates `self × pct / 100` using decimal arithmetic, rounded to two places.
    pub fn percentage(&self, pct: Decimal) -> Result<Self, MoneyConversionError> {
        let raw = self
            .to_decimal()
            .checked_mul(pct)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
            .ok_or_else(|| MoneyConversionError(format!("{self} × {pct}% overflows")))?;
        Self::from_decimal_rounded(raw)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.to_decimal()
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::try_from_decimal(value)
    }
}

impl FromStr for Money {
    type Err = MoneyConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|e| MoneyConversionError(format!("'{s}': {e}")))?;
        Self::try_from_decimal(value)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

struct MoneyVisitor;

impl<'de> Visitor<'de> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("a decimal amount with at most two fractional digits")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Money::from_str(v).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Money::try_from_decimal(Decimal::from(v)).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Money::try_from_decimal(Decimal::from(v)).map_err(E::custom)
    }

    // JSON numbers such as 19.99 arrive as f64. Their shortest round-trip representation is the literal the client
    // sent, so parsing that text keeps the conversion exact.
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if !v.is_finite() {
            return Err(E::custom(format!("{v} is not a finite amount")));
        }
        Money::from_str(&v.to_string()).map_err(E::custom)
    }
}
