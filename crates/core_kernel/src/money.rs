//! Money types with exact minor-unit arithmetic
//!
//! This module provides a type-safe representation of monetary values as
//! whole minor-unit integers (cents for USD, fils for BHD, whole yen for
//! JPY). Decimal conversion happens only at the boundary, using
//! rust_decimal, so no floating-point error can enter a stored amount.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;
use thiserror::Error;

/// The largest minor-unit exponent any supported currency uses (BHD/KWD use 3).
pub const MAX_MINOR_UNIT: u32 = 4;

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Currency mismatch: cannot operate on {0} and {1}")]
    CurrencyMismatch(String, String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("Overflow during calculation")]
    Overflow,
}

/// An ISO 4217-style currency code, normalized to uppercase ASCII
///
/// The set of valid currencies is open: which codes exist, and how many
/// minor-unit digits each carries, is the currency catalog's concern.
/// Normalizing at construction makes every comparison between two codes
/// case-insensitive by definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    /// Parses and normalizes a currency code
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::InvalidCurrency` unless the input is exactly
    /// three ASCII letters (surrounding whitespace is tolerated).
    pub fn new(code: &str) -> Result<Self, MoneyError> {
        let trimmed = code.trim();
        if trimmed.len() != 3 || !trimmed.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(MoneyError::InvalidCurrency(code.to_string()));
        }
        let mut bytes = [0u8; 3];
        for (i, b) in trimmed.bytes().enumerate() {
            bytes[i] = b.to_ascii_uppercase();
        }
        Ok(Self(bytes))
    }

    /// Returns the code as a string slice
    pub fn as_str(&self) -> &str {
        // Construction guarantees ASCII uppercase.
        std::str::from_utf8(&self.0).expect("currency code is ASCII")
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = MoneyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl TryFrom<&str> for CurrencyCode {
    type Error = MoneyError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> String {
        code.as_str().to_string()
    }
}

/// Rounds a decimal to a whole minor-unit count, half away from zero
///
/// This is the single rounding law of the system: a value exactly halfway
/// between two representable minor units rounds toward the larger
/// magnitude (`0.5 -> 1`, `-0.5 -> -1`). Never banker's rounding, never
/// truncation.
pub fn round_to_minor(value: Decimal) -> Result<i64, MoneyError> {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(MoneyError::Overflow)
}

fn minor_factor(minor_unit: u32) -> Decimal {
    Decimal::from(10_i64.pow(minor_unit))
}

/// An exact monetary amount bound to a currency and a minor-unit exponent
///
/// The amount is stored as a whole number of minor units; no operation can
/// introduce a fractional minor unit. Two values participate in arithmetic
/// only when both the currency and the minor unit match - a mismatch is a
/// programming error, not a recoverable condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount_minor: i64,
    currency: CurrencyCode,
    minor_unit: u32,
}

impl Money {
    /// Creates Money directly from a minor-unit integer, with no rounding
    pub fn from_minor(amount_minor: i64, currency: CurrencyCode, minor_unit: u32) -> Self {
        debug_assert!(minor_unit <= MAX_MINOR_UNIT);
        Self {
            amount_minor,
            currency,
            minor_unit,
        }
    }

    /// Converts a decimal amount to minor units
    ///
    /// Rounding at the minor-unit boundary follows [`round_to_minor`]:
    /// half away from zero.
    pub fn from_decimal(
        amount: Decimal,
        currency: CurrencyCode,
        minor_unit: u32,
    ) -> Result<Self, MoneyError> {
        let scaled = amount
            .checked_mul(minor_factor(minor_unit))
            .ok_or(MoneyError::Overflow)?;
        let amount_minor = round_to_minor(scaled)?;
        Ok(Self::from_minor(amount_minor, currency, minor_unit))
    }

    /// Parses a decimal string and converts it to minor units
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::InvalidAmount` if the string is not a valid
    /// decimal number.
    pub fn from_decimal_str(
        amount: &str,
        currency: CurrencyCode,
        minor_unit: u32,
    ) -> Result<Self, MoneyError> {
        let parsed = Decimal::from_str(amount.trim())
            .map_err(|e| MoneyError::InvalidAmount(format!("{}: {}", amount, e)))?;
        Self::from_decimal(parsed, currency, minor_unit)
    }

    /// Converts a float to minor units, rejecting NaN and infinities
    ///
    /// Floats never enter stored amounts; this is strictly an ingestion
    /// convenience for hosts that receive JSON numbers.
    pub fn from_f64(
        amount: f64,
        currency: CurrencyCode,
        minor_unit: u32,
    ) -> Result<Self, MoneyError> {
        let parsed = Decimal::from_f64(amount)
            .ok_or_else(|| MoneyError::InvalidAmount(format!("{} is not a finite number", amount)))?;
        Self::from_decimal(parsed, currency, minor_unit)
    }

    /// Creates a zero amount in the given currency
    pub fn zero(currency: CurrencyCode, minor_unit: u32) -> Self {
        Self::from_minor(0, currency, minor_unit)
    }

    /// Returns the amount in minor units
    pub fn amount_minor(&self) -> i64 {
        self.amount_minor
    }

    /// Returns the currency code
    pub fn currency(&self) -> CurrencyCode {
        self.currency
    }

    /// Returns the minor-unit exponent
    pub fn minor_unit(&self) -> u32 {
        self.minor_unit
    }

    /// Returns the exact decimal value, scaled to the minor unit
    ///
    /// The precise inverse of [`Money::from_minor`]: the decimal carries
    /// exactly `minor_unit` fractional digits.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.amount_minor, self.minor_unit)
    }

    /// Renders the amount as a fixed-point string
    ///
    /// Always prints exactly `minor_unit` fractional digits: `"12.50"`,
    /// never `"12.5"`.
    pub fn to_decimal_string(&self) -> String {
        self.to_decimal().to_string()
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.amount_minor == 0
    }

    /// Returns true if the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.amount_minor > 0
    }

    /// Returns true if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.amount_minor < 0
    }

    /// Returns the absolute value
    pub fn abs(&self) -> Self {
        Self {
            amount_minor: self.amount_minor.abs(),
            ..*self
        }
    }

    fn unit_label(&self) -> String {
        format!("{} (minor unit {})", self.currency, self.minor_unit)
    }

    fn require_same_unit(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency || self.minor_unit != other.minor_unit {
            return Err(MoneyError::CurrencyMismatch(
                self.unit_label(),
                other.unit_label(),
            ));
        }
        Ok(())
    }

    /// Checked addition that returns an error on currency mismatch
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.require_same_unit(other)?;
        let amount_minor = self
            .amount_minor
            .checked_add(other.amount_minor)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor(amount_minor, self.currency, self.minor_unit))
    }

    /// Checked subtraction that returns an error on currency mismatch
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.require_same_unit(other)?;
        let amount_minor = self
            .amount_minor
            .checked_sub(other.amount_minor)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor(amount_minor, self.currency, self.minor_unit))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.currency, self.to_decimal_string())
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        self.checked_add(&other)
            .expect("Currency mismatch in Money::add")
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self.checked_sub(&other)
            .expect("Currency mismatch in Money::sub")
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            amount_minor: -self.amount_minor,
            ..self
        }
    }
}

/// A percentage rate held as an exact fraction (e.g. 0.0825 for 8.25%)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    value: Decimal,
}

impl Rate {
    /// Creates a rate from a decimal fraction (e.g. 0.05 for 5%)
    pub fn new(value: Decimal) -> Self {
        Self { value }
    }

    /// Creates a rate from a percentage (e.g. 5.0 for 5%)
    pub fn from_percentage(percentage: Decimal) -> Self {
        Self {
            value: percentage / Decimal::ONE_HUNDRED,
        }
    }

    /// Returns the rate as a decimal fraction
    pub fn as_decimal(&self) -> Decimal {
        self.value
    }

    /// Returns the rate as a percentage
    pub fn as_percentage(&self) -> Decimal {
        self.value * Decimal::ONE_HUNDRED
    }

    /// Applies this rate to a minor-unit base, rounding half away from zero
    ///
    /// Each application rounds independently; callers stacking several
    /// rates accept that the sum of roundings may differ from a single
    /// combined-rate computation by up to one minor unit per rate.
    pub fn apply_to_minor(&self, base_minor: i64) -> Result<i64, MoneyError> {
        let product = Decimal::from(base_minor)
            .checked_mul(self.value)
            .ok_or(MoneyError::Overflow)?;
        round_to_minor(product)
    }

    /// Applies this rate to a Money value, preserving its currency and unit
    pub fn apply(&self, money: &Money) -> Result<Money, MoneyError> {
        let amount_minor = self.apply_to_minor(money.amount_minor())?;
        Ok(Money::from_minor(
            amount_minor,
            money.currency(),
            money.minor_unit(),
        ))
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage().normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd() -> CurrencyCode {
        CurrencyCode::new("USD").unwrap()
    }

    #[test]
    fn test_currency_code_normalizes_case() {
        let lower = CurrencyCode::new("eur").unwrap();
        let upper = CurrencyCode::new("EUR").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.as_str(), "EUR");
    }

    #[test]
    fn test_currency_code_rejects_bad_input() {
        assert!(CurrencyCode::new("US").is_err());
        assert!(CurrencyCode::new("USDX").is_err());
        assert!(CurrencyCode::new("U5D").is_err());
        assert!(CurrencyCode::new("").is_err());
    }

    #[test]
    fn test_money_from_minor_is_exact() {
        let m = Money::from_minor(10050, usd(), 2);
        assert_eq!(m.amount_minor(), 10050);
        assert_eq!(m.to_decimal(), dec!(100.50));
    }

    #[test]
    fn test_rounding_law_half_away_from_zero() {
        let up = Money::from_decimal_str("0.005", usd(), 2).unwrap();
        assert_eq!(up.amount_minor(), 1);

        let down = Money::from_decimal_str("-0.005", usd(), 2).unwrap();
        assert_eq!(down.amount_minor(), -1);
    }

    #[test]
    fn test_from_f64_rejects_non_finite() {
        assert!(matches!(
            Money::from_f64(f64::NAN, usd(), 2),
            Err(MoneyError::InvalidAmount(_))
        ));
        assert!(matches!(
            Money::from_f64(f64::INFINITY, usd(), 2),
            Err(MoneyError::InvalidAmount(_))
        ));
        assert_eq!(Money::from_f64(12.5, usd(), 2).unwrap().amount_minor(), 1250);
    }

    #[test]
    fn test_decimal_string_keeps_trailing_zeros() {
        let m = Money::from_minor(1250, usd(), 2);
        assert_eq!(m.to_decimal_string(), "12.50");

        let jpy = CurrencyCode::new("JPY").unwrap();
        assert_eq!(Money::from_minor(1250, jpy, 0).to_decimal_string(), "1250");
    }

    #[test]
    fn test_currency_mismatch() {
        let a = Money::from_minor(100, usd(), 2);
        let eur = CurrencyCode::new("EUR").unwrap();
        let b = Money::from_minor(100, eur, 2);

        assert!(matches!(
            a.checked_add(&b),
            Err(MoneyError::CurrencyMismatch(_, _))
        ));
    }

    #[test]
    fn test_minor_unit_mismatch_is_a_mismatch() {
        let a = Money::from_minor(100, usd(), 2);
        let b = Money::from_minor(100, usd(), 0);

        assert!(matches!(
            a.checked_sub(&b),
            Err(MoneyError::CurrencyMismatch(_, _))
        ));
    }

    #[test]
    fn test_rate_application() {
        let rate = Rate::from_percentage(dec!(8.25));
        // 3150 * 0.0825 = 259.875 -> 260
        assert_eq!(rate.apply_to_minor(3150).unwrap(), 260);
    }
}
