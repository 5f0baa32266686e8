//! Scans the raw contents of a ledger file (canonical or snapshot) and separates the records that
//! decode and validate from the lines that do not.
//!
//! The scan is pure. It never fixes anything; deciding what to do about damage is up to the
//! store.

use crate::codec::{self, HEADER};
use crate::error::DecodeError;
use crate::model::Transaction;
use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Why a line was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorruptReason {
    /// The file is empty, so even the header is gone.
    MissingHeader,
    /// The first line is not the expected header.
    BadHeader(String),
    InvalidUtf8,
    Decode(DecodeError),
}

impl Display for CorruptReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CorruptReason::MissingHeader => write!(f, "the header line is missing"),
            CorruptReason::BadHeader(found) => {
                write!(f, "expected the header '{HEADER}' but found '{found}'")
            }
            CorruptReason::InvalidUtf8 => write!(f, "the line is not valid UTF-8"),
            CorruptReason::Decode(e) => write!(f, "{e}"),
        }
    }
}

impl Serialize for CorruptReason {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// A single damaged line. `line` is the 1-based physical line number; the header is line 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorruptLine {
    pub line: usize,
    pub reason: CorruptReason,
}

/// The outcome of checking a file's lines.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub valid_count: usize,
    pub corrupt_lines: Vec<CorruptLine>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.corrupt_lines.is_empty()
    }
}

impl Display for IntegrityReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} valid record(s), {} corrupt line(s)",
            self.valid_count,
            self.corrupt_lines.len()
        )?;
        for corrupt in &self.corrupt_lines {
            write!(f, "\n  line {}: {}", corrupt.line, corrupt.reason)?;
        }
        Ok(())
    }
}

/// The valid records of a file, in file order, together with the report.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Scan {
    pub transactions: Vec<Transaction>,
    pub report: IntegrityReport,
}

/// Checks every line of `contents`.
///
/// - An empty file is reported as [`CorruptReason::MissingHeader`] on line 1.
/// - A first line other than the header is reported and the remaining lines are still checked.
/// - Blank lines carry no data and are skipped.
/// - A single `\r` before the `\n` is tolerated.
/// - Identical records are not treated as damage.
pub fn check(contents: &[u8]) -> Scan {
    let mut scan = Scan::default();
    if contents.is_empty() {
        scan.report.corrupt_lines.push(CorruptLine {
            line: 1,
            reason: CorruptReason::MissingHeader,
        });
        return scan;
    }

    for (ix, raw) in contents.split(|&b| b == b'\n').enumerate() {
        let number = ix + 1;
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);

        let line = match std::str::from_utf8(raw) {
            Ok(line) => line,
            Err(_) => {
                scan.corrupt(number, CorruptReason::InvalidUtf8);
                continue;
            }
        };

        if number == 1 {
            let header = line.strip_prefix('\u{feff}').unwrap_or(line);
            if header != HEADER {
                scan.corrupt(number, CorruptReason::BadHeader(header.to_string()));
            }
            continue;
        }

        if line.trim().is_empty() {
            continue;
        }

        match codec::decode(line) {
            Ok(transaction) => scan.transactions.push(transaction),
            Err(e) => scan.corrupt(number, CorruptReason::Decode(e)),
        }
    }

    scan.report.valid_count = scan.transactions.len();
    scan
}

impl Scan {
    fn corrupt(&mut self, line: usize, reason: CorruptReason) {
        self.report.corrupt_lines.push(CorruptLine { line, reason });
    }
}
