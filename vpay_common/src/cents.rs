use std::{
    fmt::Display,
    ops::{Add, AddAssign, Sub, SubAssign},
    str::FromStr,
};

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const CURRENCY_CODE: &str = "CNY";

//--------------------------------------        Cents        ---------------------------------------------------------
/// An exact amount of money, in minor units (fen). All price arithmetic in the engine happens on this type, never on
/// floats. It renders with exactly two decimal digits, which is also the form used inside request signatures.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Hash)]
#[sqlx(transparent)]
pub struct Cents(i64);

op!(binary Cents, Add, add);
op!(binary Cents, Sub, sub);
op!(inplace Cents, AddAssign, add_assign);
op!(inplace Cents, SubAssign, sub_assign);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CentsConversionError {
    #[error("{0} has more than two decimal places")]
    TooPrecise(String),
    #[error("{0} is too large to represent")]
    OutOfRange(String),
    #[error("{0} is not a valid amount")]
    InvalidFormat(String),
}

impl From<i64> for Cents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<Decimal> for Cents {
    type Error = CentsConversionError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        let normalized = value.normalize();
        let scale = normalized.scale();
        if scale > 2 {
            return Err(CentsConversionError::TooPrecise(value.to_string()));
        }
        let factor = 10i128.pow(2 - scale);
        normalized
            .mantissa()
            .checked_mul(factor)
            .and_then(|v| i64::try_from(v).ok())
            .map(Self)
            .ok_or_else(|| CentsConversionError::OutOfRange(value.to_string()))
    }
}

impl FromStr for Cents {
    type Err = CentsConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|_| CentsConversionError::InvalidFormat(s.to_string()))?;
        Self::try_from(value)
    }
}

impl Display for Cents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for Cents {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Cents {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Self::try_from(value).map_err(serde::de::Error::custom)
    }
}

impl Cents {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }
}
