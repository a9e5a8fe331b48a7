//! Integer money and rate types backed by lossless decimal parsing.
//!
//! Amounts are whole cents and rates are basis points so fee arithmetic stays
//! in integers. User-facing inputs (dollar amounts, percentages) are parsed
//! through rust_decimal to avoid floating-point drift.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing user-entered money or rate values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("{0} is not a number")]
    NotANumber(String),
    #[error("{0} must be greater than zero")]
    NotPositive(String),
    #[error("{0} is out of range")]
    OutOfRange(String),
}

/// An amount of money in whole cents.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cents(pub i64);

impl Cents {
    pub const ZERO: Cents = Cents(0);

    pub fn new(cents: i64) -> Self {
        Cents(cents)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is > 0.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Parse a dollar amount such as `"300000"`, `"$1,250.50"` or `"99.995"`.
    ///
    /// Sub-cent digits round half away from zero. Zero and negative amounts
    /// are rejected.
    pub fn from_dollars(input: &str) -> Result<Self, MoneyError> {
        let value = parse_decimal(input)?;
        if value <= Decimal::ZERO {
            return Err(MoneyError::NotPositive(input.trim().to_string()));
        }
        let cents = value
            .checked_mul(Decimal::ONE_HUNDRED)
            .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|v| v.to_i64())
            .ok_or_else(|| MoneyError::OutOfRange(input.trim().to_string()))?;
        Ok(Cents(cents))
    }

    /// Dollar amount with two decimals and no currency symbol (`"2250.00"`).
    pub fn to_dollars_string(&self) -> String {
        Decimal::new(self.0, 2).to_string()
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = (abs / 100).to_string();
        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, ch) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        write!(f, "{}${}.{:02}", sign, grouped, abs % 100)
    }
}

/// A rate in basis points (100 bp = 1%).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BasisPoints(pub i64);

impl BasisPoints {
    pub fn new(bp: i64) -> Self {
        BasisPoints(bp)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Convert a percentage (`"2.5"` or `"2.5%"`) into basis points.
    ///
    /// Fractional basis points round half away from zero. Zero and negative
    /// percentages are rejected.
    pub fn from_percent(input: &str) -> Result<Self, MoneyError> {
        let trimmed = input.trim().trim_end_matches('%');
        let value = parse_decimal(trimmed)?;
        if value <= Decimal::ZERO {
            return Err(MoneyError::NotPositive(input.trim().to_string()));
        }
        let bp = value
            .checked_mul(Decimal::ONE_HUNDRED)
            .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|v| v.to_i64())
            .ok_or_else(|| MoneyError::OutOfRange(input.trim().to_string()))?;
        if bp <= 0 {
            return Err(MoneyError::NotPositive(input.trim().to_string()));
        }
        Ok(BasisPoints(bp))
    }
}

impl fmt::Display for BasisPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bp", self.0)
    }
}

fn parse_decimal(input: &str) -> Result<Decimal, MoneyError> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',' && *c != '_')
        .collect();
    if cleaned.is_empty() {
        return Err(MoneyError::NotANumber(input.to_string()));
    }
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|_| MoneyError::NotANumber(input.trim().to_string()))
}

/// Deserialize an integer field that may arrive as a number, a float, a
/// numeric string or null. Anything unusable becomes `None`.
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_i64))
}

pub(crate) fn value_to_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .and_then(|f| Decimal::from_f64_retain(f))
                .and_then(|d| {
                    d.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                        .to_i64()
                })
        }),
        serde_json::Value::String(s) => parse_decimal(s).ok().and_then(|d| {
            d.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
        }),
        _ => None,
    }
}

/// Deserialize a user-entered numeric value (number or string) into its
/// textual form so it can be parsed losslessly later.
pub fn numeric_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a number or numeric string, got {}",
            other
        ))),
    }
}

/// Deserialize a field whose absence and explicit null must stay distinct.
///
/// Pair with `#[serde(default)]`: a missing key yields `None`, `null` yields
/// `Some(None)`.
pub fn explicit_null<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
