//! Error types for the ledger.
//!
//! Configuration and command handling use `anyhow` (see [`Error`] and [`Result`]). The
//! persistence layer returns the typed errors below so that callers can tell a rejected input
//! apart from a damaged file, a failed write, or a failed backup.

use chrono::NaiveDate;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// A candidate transaction was rejected by the record model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid date '{value}', expected the format '{format}'")]
    InvalidDate { value: String, format: String },
    #[error("invalid amount '{value}': {reason}")]
    InvalidAmount { value: String, reason: String },
    #[error("the category must not be empty")]
    EmptyCategory,
}

/// A line of the canonical file could not be turned back into a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed line: {0}")]
    MalformedLine(String),
    #[error("expected {expected} fields but found {found}")]
    FieldCountMismatch { expected: usize, found: usize },
    #[error("invalid record: {0}")]
    Invalid(#[from] ValidationError),
}

/// The canonical file could not be replaced or appended to.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("unable to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to move the new contents into place at {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl WriteError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        WriteError::Io {
            path: path.into(),
            source,
        }
    }
}

/// `append` failed, either before anything was written or while writing.
#[derive(Debug, Error)]
pub enum AppendError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The existing ledger could not be loaded or recovered, so nothing was appended.
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// The canonical file could not be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Nothing valid is left in the canonical file and no snapshot can replace it.
    #[error("the ledger at {} cannot be recovered: {reason}", path.display())]
    Unrecoverable { path: PathBuf, reason: String },
    #[error("unable to restore the ledger from snapshot {}: {source}", snapshot.display())]
    Restore {
        snapshot: PathBuf,
        #[source]
        source: WriteError,
    },
    #[error("unable to read the ledger at {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A snapshot could not be written, rotated, or listed.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to serialize the manifest for {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("a snapshot named {} already exists", path.display())]
    Exists { path: PathBuf },
    #[error("no snapshot sequence numbers are left for {date}")]
    SequenceExhausted { date: NaiveDate },
}

impl BackupError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        BackupError::Io {
            path: path.into(),
            source,
        }
    }
}
