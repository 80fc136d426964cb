//! Amount and Balance types
//!
//! Domain primitives for monetary values. Amounts are validated at
//! construction time so an invalid amount never reaches the store.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum allowed amount or balance (1 trillion)
const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Maximum decimal places (cents)
const MAX_SCALE: u32 = 2;

/// Amount represents a validated, strictly positive monetary value.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Maximum 2 decimal places
/// - Maximum value is 1 trillion
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use wallet_ledger::domain::Amount;
///
/// let amount = Amount::new(Decimal::new(10050, 2)).unwrap();
/// assert_eq!(amount.value(), Decimal::new(10050, 2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

/// Errors that can occur when creating an Amount or Balance
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount has too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,

    #[error("Balance cannot become negative (got {0})")]
    NegativeBalance(Decimal),

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::TooManyDecimals` if more than 2 decimal places
    /// - `AmountError::Overflow` if value > 1 trillion
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }

        // 10.50 and 10.5 are the same amount; only significant digits count
        let normalized = value.normalize();
        if normalized.scale() > MAX_SCALE {
            return Err(AmountError::TooManyDecimals(normalized.scale()));
        }

        if value > MAX_AMOUNT {
            return Err(AmountError::Overflow);
        }

        Ok(Self(value))
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s.trim())
            .map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::new(decimal)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Balance represents a wallet balance (zero or positive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Balance(Decimal);

impl Balance {
    /// Create a new balance (zero or positive)
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value < Decimal::ZERO {
            return Err(AmountError::NegativeBalance(value));
        }

        if value > MAX_AMOUNT {
            return Err(AmountError::Overflow);
        }

        Ok(Self(value))
    }

    /// Create a zero balance
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Get the underlying value
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Check if balance covers a withdrawal of `amount`
    pub fn is_sufficient_for(&self, amount: &Amount) -> bool {
        self.0 >= amount.value()
    }

    /// Add amount to balance
    pub fn credit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        Balance::new(self.0 + amount.value())
    }

    /// Subtract amount from balance
    pub fn debit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        Balance::new(self.0 - amount.value())
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::zero()
    }
}

impl TryFrom<Decimal> for Balance {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Balance::new(value)
    }
}

impl From<Balance> for Decimal {
    fn from(balance: Balance) -> Self {
        balance.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_positive() {
        let amount = Amount::new(dec!(100));
        assert!(amount.is_ok());
        assert_eq!(amount.unwrap().value(), dec!(100));
    }

    #[test]
    fn test_amount_zero_rejected() {
        let amount = Amount::new(Decimal::ZERO);
        assert!(matches!(amount, Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_negative_rejected() {
        let amount = Amount::new(dec!(-0.01));
        assert!(matches!(amount, Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_too_many_decimals() {
        let amount = Amount::new(dec!(0.001));
        assert!(matches!(amount, Err(AmountError::TooManyDecimals(3))));
    }

    #[test]
    fn test_amount_trailing_zeros_ok() {
        // 1.5000 has scale 4 but only one significant decimal
        assert!(Amount::new(dec!(1.5000)).is_ok());
    }

    #[test]
    fn test_amount_overflow() {
        assert_eq!(MAX_AMOUNT, dec!(1000000000000));
        assert!(matches!(
            Amount::new(dec!(1000000000000.01)),
            Err(AmountError::Overflow)
        ));
        assert!(Amount::new(dec!(1000000000000)).is_ok());
    }

    #[test]
    fn test_amount_from_str() {
        let amount: Amount = " 123.45 ".parse().unwrap();
        assert_eq!(amount.value(), dec!(123.45));
        assert!(matches!(
            "abc".parse::<Amount>(),
            Err(AmountError::ParseError(_))
        ));
    }

    #[test]
    fn test_amount_display_two_places() {
        assert_eq!(Amount::new(dec!(7)).unwrap().to_string(), "7.00");
    }

    #[test]
    fn test_amount_deserialize_validates() {
        let ok: Amount = serde_json::from_str("\"10.25\"").unwrap();
        assert_eq!(ok.value(), dec!(10.25));

        let err = serde_json::from_str::<Amount>("\"-3\"");
        assert!(err.is_err());
    }

    #[test]
    fn test_balance_credit_debit() {
        let balance = Balance::zero();
        let balance = balance.credit(&Amount::new(dec!(100)).unwrap()).unwrap();
        assert_eq!(balance.value(), dec!(100));

        let balance = balance.debit(&Amount::new(dec!(30)).unwrap()).unwrap();
        assert_eq!(balance.value(), dec!(70));
    }

    #[test]
    fn test_balance_insufficient() {
        let balance = Balance::new(dec!(50)).unwrap();
        let amount = Amount::new(dec!(100)).unwrap();

        assert!(!balance.is_sufficient_for(&amount));
        assert!(matches!(
            balance.debit(&amount),
            Err(AmountError::NegativeBalance(_))
        ));
    }

    #[test]
    fn test_balance_exact_debit_reaches_zero() {
        let balance = Balance::new(dec!(30)).unwrap();
        let amount = Amount::new(dec!(30)).unwrap();
        assert!(balance.is_sufficient_for(&amount));
        assert_eq!(balance.debit(&amount).unwrap(), Balance::zero());
    }
}
