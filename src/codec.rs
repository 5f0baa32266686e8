//! Conversion between a `Transaction` and one line of the canonical ledger file.
//!
//! # Format
//!
//! The canonical file is UTF-8 CSV with `\n` line endings. The first line is [`HEADER`]. Every
//! other line holds one transaction as four comma-separated fields: `date,amount,category,description`.
//!
//! - `date` is always `YYYY-MM-DD`.
//! - `amount` is a plain decimal with an optional leading `-`, e.g. `-42.50`.
//! - Before quoting, every field is escaped so that a record never spans lines: `\` becomes
//!   `\\`, a line feed becomes `\n` and a carriage return becomes `\r`. No other escape exists.
//! - After escaping, a field containing `,` or `"` is wrapped in double quotes and each `"` inside
//!   it is doubled (RFC 4180). Other fields are written bare.
//!
//! Decoding is strict: quoting or escaping that this encoder could not have produced (and that
//! RFC 4180 would not accept) fails with [`DecodeError::MalformedLine`] instead of guessing where
//! a field ends.

use crate::error::DecodeError;
use crate::model::{validate, Candidate, Transaction, ISO_DATE};
use std::borrow::Cow;

/// The first line of every canonical file.
pub const HEADER: &str = "date,amount,category,description";

/// The number of fields in a record line.
pub const FIELD_COUNT: usize = 4;

/// Encodes a transaction as a single line without a line terminator.
pub fn encode(transaction: &Transaction) -> String {
    let c = transaction.to_candidate();
    [&c.date, &c.amount, &c.category, &c.description]
        .into_iter()
        .map(|field| quote(&escape(field)).into_owned())
        .collect::<Vec<_>>()
        .join(",")
}

/// Decodes a single line (without its terminator) into a validated transaction.
pub fn decode(line: &str) -> Result<Transaction, DecodeError> {
    let candidate = decode_fields(line)?;
    Ok(validate(&candidate, ISO_DATE)?)
}

/// Splits a line into its unescaped fields without applying the record rules.
pub fn decode_fields(line: &str) -> Result<Candidate, DecodeError> {
    check_quoting(line)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());

    let record = match reader.records().next() {
        Some(Ok(record)) => record,
        Some(Err(e)) => return Err(DecodeError::MalformedLine(e.to_string())),
        None => {
            return Err(DecodeError::FieldCountMismatch {
                expected: FIELD_COUNT,
                found: 0,
            })
        }
    };

    if record.len() != FIELD_COUNT {
        return Err(DecodeError::FieldCountMismatch {
            expected: FIELD_COUNT,
            found: record.len(),
        });
    }

    let fields = record
        .iter()
        .map(unescape)
        .collect::<Result<Vec<_>, _>>()?;
    let [date, amount, category, description]: [String; FIELD_COUNT] =
        fields.try_into().map_err(|v: Vec<String>| DecodeError::FieldCountMismatch {
            expected: FIELD_COUNT,
            found: v.len(),
        })?;
    Ok(Candidate {
        date,
        amount,
        category,
        description,
    })
}

fn escape(field: &str) -> Cow<'_, str> {
    if !field.contains(['\\', '\n', '\r']) {
        return Cow::Borrowed(field);
    }
    let mut out = String::with_capacity(field.len() + 2);
    for ch in field.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

fn unescape(field: &str) -> Result<String, DecodeError> {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => {
                return Err(DecodeError::MalformedLine(format!(
                    "unknown escape sequence '\\{other}'"
                )))
            }
            None => {
                return Err(DecodeError::MalformedLine(
                    "dangling escape character at the end of a field".to_string(),
                ))
            }
        }
    }
    Ok(out)
}

fn quote(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Quoting {
    FieldStart,
    Bare,
    Quoted,
    /// A `"` was seen inside a quoted field; it either doubles or closes.
    QuoteInQuoted,
}

/// Walks the line once with the RFC 4180 rules. The `csv` reader is lenient about stray quotes,
/// which would let a damaged line decode into shifted fields.
fn check_quoting(line: &str) -> Result<(), DecodeError> {
    let malformed = |msg: String| Err(DecodeError::MalformedLine(msg));
    let mut state = Quoting::FieldStart;
    for (ix, ch) in line.char_indices() {
        if ch == '\n' || ch == '\r' {
            return malformed(format!("unescaped line break at byte {ix}"));
        }
        state = match (state, ch) {
            (Quoting::FieldStart, '"') => Quoting::Quoted,
            (Quoting::FieldStart, ',') => Quoting::FieldStart,
            (Quoting::FieldStart, _) => Quoting::Bare,
            (Quoting::Bare, '"') => return malformed(format!("stray quote at byte {ix}")),
            (Quoting::Bare, ',') => Quoting::FieldStart,
            (Quoting::Bare, _) => Quoting::Bare,
            (Quoting::Quoted, '"') => Quoting::QuoteInQuoted,
            (Quoting::Quoted, _) => Quoting::Quoted,
            (Quoting::QuoteInQuoted, '"') => Quoting::Quoted,
            (Quoting::QuoteInQuoted, ',') => Quoting::FieldStart,
            (Quoting::QuoteInQuoted, _) => {
                return malformed(format!("closing quote followed by '{ch}' at byte {ix}"))
            }
        };
    }
    if state == Quoting::Quoted {
        return malformed("unterminated quoted field".to_string());
    }
    Ok(())
}
