//! Amount type for handling signed monetary values.
//!
//! This module provides the `Amount` type which wraps `Decimal`. Human input may include a dollar
//! sign and commas, but the canonical form written to disk is always a plain decimal.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// Represents a signed dollar amount. Negative amounts are expenses, everything else is income.
///
/// # Examples
///
/// Parsing with a dollar sign and commas:
/// ```
/// # use ledger_keeper::model::Amount;
/// # use std::str::FromStr;
/// let amount = Amount::from_str("-$1,250.00").unwrap();
/// assert_eq!(amount.to_string(), "-1250.00");
/// assert_eq!(amount.to_money_string(), "-$1,250.00");
/// ```
///
/// Values that are not finite numbers are rejected:
/// ```
/// # use ledger_keeper::model::Amount;
/// # use std::str::FromStr;
/// assert!(Amount::from_str("NaN").is_err());
/// assert!(Amount::from_str("").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is strictly below zero, i.e. an expense.
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Formats the amount for people, e.g. `-$60,000.00`.
    pub fn to_money_string(&self) -> String {
        let sign = if self.is_negative() { "-" } else { "" };
        let num = self.0.abs().to_f64().unwrap_or_default();
        format!("{sign}${}", format_num::format_num!(",.2", num))
    }
}

/// An error that can occur when parsing strings into `Amount` values.
#[derive(Clone, PartialEq, Eq)]
pub struct AmountError(String);

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for AmountError {}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AmountError("an amount is required".to_string()));
        }

        let lower = trimmed.trim_start_matches(['-', '+']).to_ascii_lowercase();
        if matches!(lower.as_str(), "nan" | "inf" | "infinity") {
            return Err(AmountError("the amount must be a finite number".to_string()));
        }

        // "-$50.00", "$50.00", "-50.00"
        let without_dollar = if let Some(after_minus) = trimmed.strip_prefix('-') {
            match after_minus.strip_prefix('$') {
                Some(after_dollar) => format!("-{after_dollar}"),
                None => trimmed.to_string(),
            }
        } else if let Some(after_dollar) = trimmed.strip_prefix('$') {
            after_dollar.to_string()
        } else {
            trimmed.to_string()
        };

        let without_commas = without_dollar.replace(',', "");
        let value = Decimal::from_str(&without_commas)
            .map_err(|e| AmountError(format!("not a number ({e})")))?;
        Ok(Amount(value))
    }
}

/// The canonical form: a plain decimal with the scale it was entered with, e.g. `-42.50`.
impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}
