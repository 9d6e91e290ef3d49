use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul};
use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Currency amount held to whole cents.
///
/// Decimal input is rounded half away from zero to the nearest cent, so
/// `"10.005"` becomes `10.01` and `"-10.005"` becomes `-10.01`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn from_cents(cents: i64) -> Self {
        Self::from_decimal(Decimal::new(cents, 2))
    }

    pub fn from_major(units: i64) -> Self {
        Self::from_decimal(Decimal::from(units))
    }

    /// Round to cents and pin the scale so every amount prints as `X.YY`.
    pub fn from_decimal(value: Decimal) -> Self {
        let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(2);
        Self(rounded)
    }

    pub fn from_f64(value: f64) -> Result<Self, MoneyError> {
        if !value.is_finite() {
            return Err(MoneyError::NotFinite);
        }
        Decimal::from_f64(value)
            .map(Self::from_decimal)
            .ok_or(MoneyError::OutOfRange(value))
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MoneyError {
    #[error("'{0}' is not a valid currency amount")]
    Invalid(String),
    #[error("amount must be finite")]
    NotFinite,
    #[error("amount {0} is outside the supported currency range")]
    OutOfRange(f64),
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let cleaned = raw.trim().replace(',', "");
        if !cleaned.bytes().any(|b| b.is_ascii_digit()) {
            return Err(MoneyError::Invalid(raw.to_string()));
        }
        Decimal::from_str(&cleaned)
            .map(Self::from_decimal)
            .map_err(|_| MoneyError::Invalid(raw.to_string()))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money::from_decimal(self.0 + rhs.0)
    }
}

impl Mul<u32> for Money {
    type Output = Money;

    fn mul(self, rhs: u32) -> Money {
        Money::from_decimal(self.0 * Decimal::from(rhs))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        rust_decimal::serde::str::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawAmount {
            Text(String),
            Number(f64),
        }

        match RawAmount::deserialize(deserializer)? {
            RawAmount::Text(text) => text.parse().map_err(serde::de::Error::custom),
            RawAmount::Number(value) => Money::from_f64(value).map_err(serde::de::Error::custom),
        }
    }
}
