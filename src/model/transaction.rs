use crate::error::ValidationError;
use crate::model::Amount;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The date format used in the canonical file, independent of the configured input format.
pub const ISO_DATE: &str = "%Y-%m-%d";

/// Whether a transaction brings money in or takes it out. Derived from the sign of the amount.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Income,
    Expense,
}

serde_plain::derive_display_from_serialize!(Kind);
serde_plain::derive_fromstr_from_deserialize!(Kind);

/// A single validated ledger entry. The only way to get one is through [`validate`] (or the
/// codec, which uses it), so every `Transaction` satisfies the record invariants.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Transaction {
    date: NaiveDate,
    amount: Amount,
    category: String,
    description: String,
}

impl Transaction {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Returns `None` when the transaction was recorded without a description.
    pub fn description(&self) -> Option<&str> {
        if self.description.is_empty() {
            None
        } else {
            Some(&self.description)
        }
    }

    pub fn kind(&self) -> Kind {
        if self.amount.is_negative() {
            Kind::Expense
        } else {
            Kind::Income
        }
    }

    /// Returns the raw candidate that would validate back into this transaction.
    pub(crate) fn to_candidate(&self) -> Candidate {
        Candidate {
            date: self.date.format(ISO_DATE).to_string(),
            amount: self.amount.to_string(),
            category: self.category.clone(),
            description: self.description.clone(),
        }
    }
}

/// Unvalidated transaction fields as they arrive from a person or from a line of the file.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Candidate {
    pub date: String,
    pub amount: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
}

impl Candidate {
    pub fn new(
        date: impl Into<String>,
        amount: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            date: date.into(),
            amount: amount.into(),
            category: category.into(),
            description: description.into(),
        }
    }

    pub fn validate(&self, date_format: &str) -> Result<Transaction, ValidationError> {
        validate(self, date_format)
    }
}

/// Checks a candidate against the record rules and produces a `Transaction`.
///
/// - The date must parse with `date_format` (chrono `strftime` syntax).
/// - The amount must be present, numeric and finite.
/// - The category must not be blank; it is stored trimmed.
///
/// The description is kept exactly as given.
pub fn validate(candidate: &Candidate, date_format: &str) -> Result<Transaction, ValidationError> {
    let date = NaiveDate::parse_from_str(candidate.date.trim(), date_format).map_err(|_| {
        ValidationError::InvalidDate {
            value: candidate.date.clone(),
            format: date_format.to_string(),
        }
    })?;

    let amount =
        Amount::from_str(&candidate.amount).map_err(|e| ValidationError::InvalidAmount {
            value: candidate.amount.clone(),
            reason: e.to_string(),
        })?;

    let category = candidate.category.trim();
    if category.is_empty() {
        return Err(ValidationError::EmptyCategory);
    }

    Ok(Transaction {
        date,
        amount,
        category: category.to_string(),
        description: candidate.description.clone(),
    })
}
