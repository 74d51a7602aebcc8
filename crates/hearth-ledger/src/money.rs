use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest amount accepted from user input (one billion in major units).
const MAX_CENTS: i64 = 100_000_000_000;

/// Money in minor currency units. All stored amounts use this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cents(pub i64);

#[derive(Debug, Error, PartialEq)]
pub enum MoneyError {
    #[error("Amount must be a number")]
    NotFinite,
    #[error("Amount must be greater than zero")]
    NotPositive,
    #[error("Amount is too large")]
    TooLarge,
}

impl Cents {
    /// Convert a decimal amount as typed into a form ("12.5") into cents,
    /// rounding to the nearest cent.
    pub fn from_decimal(amount: f64) -> Result<Self, MoneyError> {
        if !amount.is_finite() {
            return Err(MoneyError::NotFinite);
        }
        let cents = (amount * 100.0).round();
        if cents <= 0.0 {
            return Err(MoneyError::NotPositive);
        }
        if cents > MAX_CENTS as f64 {
            return Err(MoneyError::TooLarge);
        }
        Ok(Cents(cents as i64))
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl std::iter::Sum for Cents {
    fn sum<I: Iterator<Item = Cents>>(iter: I) -> Self {
        Cents(iter.map(|c| c.0).sum())
    }
}

const CURRENCIES: &[(&str, &str)] = &[
    ("USD", "$"),
    ("ZAR", "R"),
    ("EUR", "€"),
    ("GBP", "£"),
    ("AUD", "A$"),
    ("CAD", "C$"),
    ("JPY", "¥"),
    ("INR", "₹"),
];

pub const DEFAULT_CURRENCY: &str = "USD";

pub fn is_supported_currency(code: &str) -> bool {
    CURRENCIES.iter().any(|(c, _)| *c == code)
}

/// Symbol for a currency code; unknown codes are used as their own prefix.
pub fn currency_symbol(code: &str) -> &str {
    CURRENCIES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, symbol)| *symbol)
        .unwrap_or(code)
}

pub fn format_amount(amount: Cents, currency: &str) -> String {
    format!("{}{}", currency_symbol(currency), amount)
}
