//! The canonical ledger file and everything that reads or writes it.
//!
//! The `Store` owns the canonical file. It validates and appends new records, loads and checks
//! the file, replaces it atomically, and runs recovery from snapshots when the file is damaged.
//! Every successful mutation is followed by a snapshot; a failed snapshot is logged and never
//! fails the mutation, since the canonical write has already completed.

use crate::backup::{Backup, SnapshotHandle};
use crate::codec::{self, HEADER};
use crate::error::{AppendError, LoadError, WriteError};
use crate::integrity::{self, CorruptReason, IntegrityReport, Scan};
use crate::model::{Candidate, Transaction};
use crate::Config;
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Reads and writes the canonical ledger file.
///
/// A `Store` holds no open file handles; each operation opens the file, uses it and releases it
/// before returning, on success and on every error path.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    date_format: String,
    backup: Backup,
}

/// What was wrong with the canonical file when recovery started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Damage {
    Corrupt(IntegrityReport),
    Unreadable(String),
}

impl Display for Damage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Damage::Corrupt(report) => write!(f, "{report}"),
            Damage::Unreadable(e) => write!(f, "the file could not be read: {e}"),
        }
    }
}

/// The result of [`Store::load_all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOutcome {
    /// The file was intact.
    Clean { transactions: Vec<Transaction> },
    /// The file was damaged and has been replaced by a snapshot.
    Restored {
        transactions: Vec<Transaction>,
        snapshot: PathBuf,
        cause: Damage,
    },
    /// The file is damaged and could not be restored without losing records. The valid records
    /// are returned together with the report of the damaged lines; nothing was rewritten.
    PartialCorruption {
        transactions: Vec<Transaction>,
        report: IntegrityReport,
    },
}

impl LoadOutcome {
    /// Iterates over the valid records in file order. Call again to start over.
    pub fn transactions(&self) -> std::slice::Iter<'_, Transaction> {
        self.as_slice().iter()
    }

    pub fn into_transactions(self) -> Vec<Transaction> {
        match self {
            LoadOutcome::Clean { transactions }
            | LoadOutcome::Restored { transactions, .. }
            | LoadOutcome::PartialCorruption { transactions, .. } => transactions,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// True when the caller is looking at a subset of the ledger.
    pub fn is_degraded(&self) -> bool {
        matches!(self, LoadOutcome::PartialCorruption { .. })
    }

    /// The damaged lines that are still in the canonical file, if any.
    pub fn corruption(&self) -> Option<&IntegrityReport> {
        match self {
            LoadOutcome::PartialCorruption { report, .. } => Some(report),
            _ => None,
        }
    }

    fn as_slice(&self) -> &[Transaction] {
        match self {
            LoadOutcome::Clean { transactions }
            | LoadOutcome::Restored { transactions, .. }
            | LoadOutcome::PartialCorruption { transactions, .. } => transactions,
        }
    }
}

impl<'a> IntoIterator for &'a LoadOutcome {
    type Item = &'a Transaction;
    type IntoIter = std::slice::Iter<'a, Transaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.transactions()
    }
}

impl Store {
    /// Creates a `Store` for the canonical file named in `config`.
    pub fn new(config: &Config) -> Self {
        Self::with_settings(config.ledger_path(), config.date_format(), config.backup())
    }

    pub fn with_settings(
        path: impl Into<PathBuf>,
        date_format: impl Into<String>,
        backup: Backup,
    ) -> Self {
        Self {
            path: path.into(),
            date_format: date_format.into(),
            backup,
        }
    }

    /// The canonical ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup(&self) -> &Backup {
        &self.backup
    }

    /// Creates the canonical file holding only the header. Returns `false` and leaves the file
    /// untouched if it already exists.
    pub fn create(&self) -> Result<bool, WriteError> {
        let tmp = self.write_temp(format!("{HEADER}\n").as_bytes())?;
        match tmp.persist_noclobber(&self.path) {
            Ok(_) => {
                debug!("Created {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(WriteError::Persist {
                path: self.path.clone(),
                source: e.error,
            }),
        }
    }

    /// Validates `candidate` and appends it to the canonical file, then takes a snapshot.
    ///
    /// Nothing is opened when validation fails. The existing file is checked first and, if it is
    /// damaged, recovered the same way [`Store::load_all`] does; an unrecoverable ledger fails
    /// with [`AppendError::Load`] and nothing is written. The line is flushed and synced before
    /// the file is released. If the file is missing or empty the header is written first, and if
    /// its last line is unterminated the new record is started on a fresh line.
    pub fn append(&self, candidate: &Candidate) -> Result<Transaction, AppendError> {
        let transaction = candidate.validate(&self.date_format)?;
        self.prepare_append()?;
        let line = codec::encode(&transaction);
        self.append_line(&line)
            .map_err(|e| WriteError::io(&self.path, e))?;
        debug!("Appended '{line}' to {}", self.path.display());
        self.snapshot();
        Ok(transaction)
    }

    /// Makes sure the canonical file is fit to be appended to, restoring it from a snapshot when
    /// it is damaged. A missing file with no snapshot history is a new ledger.
    fn prepare_append(&self) -> Result<(), LoadError> {
        let fresh = match self.scan() {
            Ok(scan) if scan.report.is_clean() => return Ok(()),
            // An empty file reports nothing but its missing header.
            Ok(scan) => scan
                .report
                .corrupt_lines
                .iter()
                .all(|c| c.reason == CorruptReason::MissingHeader),
            Err(e) => e.kind() == ErrorKind::NotFound,
        };
        if fresh && self.backup.latest_valid().is_none() {
            return Ok(());
        }
        match self.load_all()? {
            LoadOutcome::PartialCorruption { report, .. } => warn!(
                "Appending to {} while {} line(s) are damaged",
                self.path.display(),
                report.corrupt_lines.len()
            ),
            _ => debug!("{} is ready for appending", self.path.display()),
        }
        Ok(())
    }

    fn append_line(&self, line: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)?;

        let mut buf = String::with_capacity(HEADER.len() + line.len() + 2);
        if file.metadata()?.len() == 0 {
            buf.push_str(HEADER);
            buf.push('\n');
        } else if !ends_with_newline(&mut file)? {
            warn!(
                "The last line of {} is unterminated, starting the new record on its own line",
                self.path.display()
            );
            buf.push('\n');
        }
        buf.push_str(line);
        buf.push('\n');

        file.write_all(buf.as_bytes())?;
        file.flush()?;
        file.sync_all()
    }

    /// Loads every valid record from the canonical file.
    ///
    /// When the file is damaged or unreadable, the newest consistent snapshot is restored if it
    /// contains every record that is still valid in the file (in order), and the file is loaded
    /// once more. Otherwise the valid records are returned as
    /// [`LoadOutcome::PartialCorruption`]. With nothing valid in the file and no usable snapshot,
    /// this fails with [`LoadError::Unrecoverable`].
    pub fn load_all(&self) -> Result<LoadOutcome, LoadError> {
        let (valid, damage) = match self.scan() {
            Ok(scan) if scan.report.is_clean() => {
                return Ok(LoadOutcome::Clean {
                    transactions: scan.transactions,
                })
            }
            Ok(scan) => {
                warn!("{} is damaged: {}", self.path.display(), scan.report);
                (scan.transactions, Damage::Corrupt(scan.report))
            }
            Err(e) => {
                warn!("Unable to read {}: {e}", self.path.display());
                (Vec::new(), Damage::Unreadable(e.to_string()))
            }
        };
        self.recover(valid, damage)
    }

    fn recover(&self, valid: Vec<Transaction>, damage: Damage) -> Result<LoadOutcome, LoadError> {
        let snapshot = match self.backup.latest_valid() {
            Some(snapshot) if is_subsequence(&valid, snapshot.transactions()) => snapshot,
            Some(snapshot) => {
                warn!(
                    "Not restoring {}: it is missing records that are still valid in {}",
                    snapshot.path().display(),
                    self.path.display()
                );
                return self.degrade(valid, damage);
            }
            None => return self.degrade(valid, damage),
        };

        warn!(
            "Restoring {} from snapshot {}",
            self.path.display(),
            snapshot.path().display()
        );
        self.replace(snapshot.contents())
            .map_err(|source| LoadError::Restore {
                snapshot: snapshot.path().to_path_buf(),
                source,
            })?;

        // One retry only; a second failure is not recovered again.
        match self.scan() {
            Ok(scan) if scan.report.is_clean() => {
                info!(
                    "Restored {} records from {}",
                    scan.report.valid_count,
                    snapshot.path().display()
                );
                Ok(LoadOutcome::Restored {
                    transactions: scan.transactions,
                    snapshot: snapshot.path().to_path_buf(),
                    cause: damage,
                })
            }
            Ok(scan) => self.degrade(scan.transactions, Damage::Corrupt(scan.report)),
            Err(e) => self.degrade(Vec::new(), Damage::Unreadable(e.to_string())),
        }
    }

    fn degrade(&self, valid: Vec<Transaction>, damage: Damage) -> Result<LoadOutcome, LoadError> {
        match damage {
            Damage::Corrupt(report) if !valid.is_empty() => {
                warn!(
                    "Continuing with {} valid records from {}",
                    valid.len(),
                    self.path.display()
                );
                Ok(LoadOutcome::PartialCorruption {
                    transactions: valid,
                    report,
                })
            }
            damage => Err(LoadError::Unrecoverable {
                path: self.path.clone(),
                reason: format!("{damage}; no valid snapshot is available"),
            }),
        }
    }

    /// Returns the records dated from `start` through `end`, both inclusive, in file order.
    /// A range whose start is after its end matches nothing.
    pub fn query_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Transaction>, LoadError> {
        let outcome = self.load_all()?;
        if let Some(report) = outcome.corruption() {
            warn!(
                "Querying a damaged ledger, {} line(s) skipped",
                report.corrupt_lines.len()
            );
        }
        Ok(outcome
            .into_transactions()
            .into_iter()
            .filter(|t| start <= t.date() && t.date() <= end)
            .collect())
    }

    /// Atomically replaces the whole canonical file with `transactions`, then takes a snapshot.
    ///
    /// The new contents are written to a temporary file next to the canonical file, synced, and
    /// renamed over it, so the canonical file is always either entirely old or entirely new.
    pub fn rewrite(&self, transactions: &[Transaction]) -> Result<(), WriteError> {
        let mut contents = String::from(HEADER);
        contents.push('\n');
        for transaction in transactions {
            contents.push_str(&codec::encode(transaction));
            contents.push('\n');
        }
        self.replace(contents.as_bytes())?;
        info!(
            "Rewrote {} with {} records",
            self.path.display(),
            transactions.len()
        );
        self.snapshot();
        Ok(())
    }

    /// Checks the canonical file without attempting any recovery.
    pub fn check(&self) -> Result<IntegrityReport, LoadError> {
        self.scan()
            .map(|scan| scan.report)
            .map_err(|source| LoadError::Unreadable {
                path: self.path.clone(),
                source,
            })
    }

    /// Replaces the canonical file with the newest consistent snapshot, whatever the file
    /// currently holds.
    pub fn restore_latest(&self) -> Result<SnapshotHandle, LoadError> {
        let snapshot =
            self.backup
                .latest_valid()
                .ok_or_else(|| LoadError::Unrecoverable {
                    path: self.path.clone(),
                    reason: format!(
                        "no valid snapshot found in {}",
                        self.backup.backups_dir().display()
                    ),
                })?;
        self.replace(snapshot.contents())
            .map_err(|source| LoadError::Restore {
                snapshot: snapshot.path().to_path_buf(),
                source,
            })?;
        info!(
            "Restored {} from {}",
            self.path.display(),
            snapshot.path().display()
        );
        Ok(snapshot)
    }

    fn scan(&self) -> io::Result<Scan> {
        let contents = std::fs::read(&self.path)?;
        Ok(integrity::check(&contents))
    }

    /// Copies the canonical file into a new snapshot. Failures are logged, not returned.
    ///
    /// A damaged file is never snapshotted, so rotation cannot push good history out.
    fn snapshot(&self) {
        let contents = match std::fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(
                    "Unable to read {} for a snapshot: {e}",
                    self.path.display()
                );
                return;
            }
        };
        let report = integrity::check(&contents).report;
        if !report.is_clean() {
            warn!(
                "Not taking a snapshot of {}, it is damaged: {report}",
                self.path.display()
            );
            return;
        }
        match self.backup.snapshot(&contents) {
            Ok(handle) => debug!("Snapshot saved to {}", handle.path().display()),
            Err(e) => warn!("The ledger was saved but the snapshot failed: {e}"),
        }
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Writes `contents` to a synced temporary file in the canonical file's directory.
    fn write_temp(&self, contents: &[u8]) -> Result<NamedTempFile, WriteError> {
        let dir = self.dir();
        std::fs::create_dir_all(dir).map_err(|e| WriteError::io(dir, e))?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| WriteError::io(dir, e))?;
        tmp.write_all(contents)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| WriteError::io(tmp.path(), e))?;
        Ok(tmp)
    }

    fn replace(&self, contents: &[u8]) -> Result<(), WriteError> {
        let tmp = self.write_temp(contents)?;
        tmp.persist(&self.path).map_err(|e| WriteError::Persist {
            path: self.path.clone(),
            source: e.error,
        })?;
        // Make the rename itself durable.
        if let Err(e) = File::open(self.dir()).and_then(|dir| dir.sync_all()) {
            debug!("Unable to sync directory {}: {e}", self.dir().display());
        }
        Ok(())
    }
}

fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// True if every item of `needle` appears in `haystack` in the same relative order.
fn is_subsequence(needle: &[Transaction], haystack: &[Transaction]) -> bool {
    let mut rest = haystack.iter();
    needle.iter().all(|t| rest.any(|s| s == t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::model::ISO_DATE;
    use crate::test::TestEnv;

    fn candidate(date: &str, amount: &str, category: &str, description: &str) -> Candidate {
        Candidate::new(date, amount, category, description)
    }

    fn tx(date: &str, amount: &str, category: &str, description: &str) -> Transaction {
        candidate(date, amount, category, description)
            .validate(ISO_DATE)
            .unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, ISO_DATE).unwrap()
    }

    fn categories(outcome: &LoadOutcome) -> Vec<String> {
        outcome
            .transactions()
            .map(|t| t.category().to_string())
            .collect()
    }

    #[test]
    fn test_groceries_scenario() {
        let env = TestEnv::new();
        let store = env.store();

        let groceries = candidate("2024-01-05", "-42.50", "Groceries", "Weekly shop");
        let stored = store.append(&groceries).unwrap();
        let outcome = store.load_all().unwrap();
        assert!(matches!(outcome, LoadOutcome::Clean { .. }));
        assert_eq!(outcome.transactions().collect::<Vec<_>>(), vec![&stored]);
        assert_eq!(stored, tx("2024-01-05", "-42.50", "Groceries", "Weekly shop"));

        let before = env.read_ledger();
        let snapshots_before = env.snapshot_files().len();
        let err = store
            .append(&candidate("2024-01-06", "-10", "", "Nothing"))
            .unwrap_err();
        assert!(matches!(
            err,
            AppendError::Validation(ValidationError::EmptyCategory)
        ));
        assert_eq!(env.read_ledger(), before);
        assert_eq!(env.snapshot_files().len(), snapshots_before);
        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_append_preserves_order_exactly_once() {
        let env = TestEnv::new();
        let store = env.store();
        for (i, category) in ["Rent", "Salary", "Coffee", "Coffee"].iter().enumerate() {
            store
                .append(&candidate(&format!("2024-02-0{}", i + 1), "-1", category, ""))
                .unwrap();
            let outcome = store.load_all().unwrap();
            assert_eq!(outcome.len(), i + 1);
        }
        let outcome = store.load_all().unwrap();
        assert_eq!(categories(&outcome), ["Rent", "Salary", "Coffee", "Coffee"]);
        // The sequence can be walked more than once.
        assert_eq!(outcome.transactions().count(), 4);
        assert_eq!((&outcome).into_iter().count(), 4);
    }

    #[test]
    fn test_append_uses_configured_date_format() {
        let env = TestEnv::with_settings(5, "%d-%m-%Y");
        let store = env.store();
        let stored = store
            .append(&candidate("05-01-2024", "-42.50", "Groceries", ""))
            .unwrap();
        assert_eq!(stored.date(), date("2024-01-05"));
        assert!(env.read_ledger().ends_with("\n2024-01-05,-42.50,Groceries,\n"));
        assert!(matches!(
            store
                .append(&candidate("2024-01-05", "-1", "Groceries", ""))
                .unwrap_err(),
            AppendError::Validation(ValidationError::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_append_takes_snapshot_of_new_state() {
        let env = TestEnv::new();
        let store = env.store();
        store
            .append(&candidate("2024-01-05", "-42.50", "Groceries", ""))
            .unwrap();
        let latest = store.backup().latest_valid().unwrap();
        assert_eq!(latest.contents(), env.read_ledger().as_bytes());
        assert_eq!(latest.transactions().len(), 1);
    }

    #[test]
    fn test_append_writes_header_into_missing_file() {
        let env = TestEnv::new();
        std::fs::remove_file(env.config().ledger_path()).unwrap();
        env.store()
            .append(&candidate("2024-01-05", "1", "Gift", ""))
            .unwrap();
        assert_eq!(env.read_ledger(), format!("{HEADER}\n2024-01-05,1,Gift,\n"));
    }

    #[test]
    fn test_append_writes_header_into_empty_file() {
        let env = TestEnv::new();
        env.write_ledger("");
        env.store()
            .append(&candidate("2024-01-05", "1", "Gift", ""))
            .unwrap();
        assert_eq!(env.read_ledger(), format!("{HEADER}\n2024-01-05,1,Gift,\n"));
    }

    #[test]
    fn test_append_recovers_damaged_ledger_first() {
        let env = TestEnv::with_settings(2, ISO_DATE);
        let store = env.store();
        for c in ["A", "B", "C"] {
            store.append(&candidate("2024-01-01", "-1", c, "")).unwrap();
        }
        let damaged = env.read_ledger().replace("2024-01-01,-1,B,", "2024-01-01,-1,B");
        env.write_ledger(&damaged);

        for c in ["D", "E"] {
            store.append(&candidate("2024-01-01", "-1", c, "")).unwrap();
        }

        let outcome = store.load_all().unwrap();
        assert!(matches!(outcome, LoadOutcome::Clean { .. }), "{outcome:?}");
        assert_eq!(categories(&outcome), ["A", "B", "C", "D", "E"]);
        let latest = store.backup().latest_valid().unwrap();
        assert_eq!(latest.transactions().len(), 5);
    }

    #[test]
    fn test_append_to_degraded_ledger_keeps_good_snapshots() {
        let env = TestEnv::with_settings(2, ISO_DATE);
        let store = env.store();
        store.append(&candidate("2024-01-01", "-1", "A", "")).unwrap();
        store.append(&candidate("2024-01-02", "-2", "B", "")).unwrap();
        let good = store.backup().latest_valid().unwrap();

        // C is in no snapshot, so the damage cannot be repaired without losing it.
        let mut contents = env.read_ledger();
        contents.push_str("2024-01-03,-3,C,\nbroken\n");
        env.write_ledger(&contents);

        for c in ["D", "E", "F"] {
            store.append(&candidate("2024-01-04", "-4", c, "")).unwrap();
        }

        let outcome = store.load_all().unwrap();
        assert!(outcome.is_degraded());
        assert_eq!(categories(&outcome), ["A", "B", "C", "D", "E", "F"]);
        assert_eq!(store.backup().latest_valid().unwrap().path(), good.path());
    }

    #[test]
    fn test_append_fails_on_unrecoverable_ledger() {
        let env = TestEnv::new();
        env.write_ledger("garbage\n");
        let err = env
            .store()
            .append(&candidate("2024-01-01", "-1", "A", ""))
            .unwrap_err();
        assert!(
            matches!(err, AppendError::Load(LoadError::Unrecoverable { .. })),
            "{err:?}"
        );
        assert_eq!(env.read_ledger(), "garbage\n");
    }

    #[test]
    fn test_snapshot_failure_does_not_fail_mutations() {
        let env = TestEnv::new();
        let backups = env.config().backups().to_path_buf();
        std::fs::remove_dir_all(&backups).unwrap();
        std::fs::write(&backups, "a file, not a directory").unwrap();
        let store = env.store();

        let stored = store.append(&candidate("2024-01-01", "-1", "A", "")).unwrap();
        let outcome = store.load_all().unwrap();
        assert!(matches!(outcome, LoadOutcome::Clean { .. }));
        assert_eq!(outcome.into_transactions(), vec![stored.clone()]);

        let kept = vec![stored, tx("2024-01-02", "5", "B", "")];
        store.rewrite(&kept).unwrap();
        assert_eq!(store.load_all().unwrap().into_transactions(), kept);
        assert!(backups.is_file());
    }

    #[test]
    fn test_append_after_torn_tail() {
        let env = TestEnv::new();
        env.write_ledger(format!("{HEADER}\n2024-01-01,-1,A,\n2024-01-02,-2"));
        let store = env.store();
        store
            .append(&candidate("2024-01-03", "-3", "C", ""))
            .unwrap();

        assert!(env.read_ledger().ends_with("2024-01-02,-2\n2024-01-03,-3,C,\n"));
        let outcome = store.load_all().unwrap();
        assert!(outcome.is_degraded());
        assert_eq!(categories(&outcome), ["A", "C"]);
        let report = outcome.corruption().unwrap();
        assert_eq!(report.corrupt_lines.len(), 1);
        assert_eq!(report.corrupt_lines[0].line, 3);
    }

    #[test]
    fn test_one_corrupt_line_among_valid_lines() {
        let env = TestEnv::new();
        let contents = format!(
            "{HEADER}\n2024-01-01,-1,A,\n2024-01-02,-2,B,\n2024-01-03,\"-3,C,\n2024-01-04,-4,D,\n"
        );
        env.write_ledger(&contents);

        let outcome = env.store().load_all().unwrap();
        assert_eq!(categories(&outcome), ["A", "B", "D"]);
        let report = outcome.corruption().unwrap();
        assert_eq!(report.valid_count, 3);
        assert_eq!(report.corrupt_lines.len(), 1);
        assert_eq!(report.corrupt_lines[0].line, 4);
        assert!(matches!(
            report.corrupt_lines[0].reason,
            CorruptReason::Decode(crate::error::DecodeError::MalformedLine(_))
        ));
        // Degraded mode never rewrites the file.
        assert_eq!(env.read_ledger(), contents);
    }

    #[test]
    fn test_restore_when_file_is_garbage() {
        let env = TestEnv::new();
        let store = env.store();
        store.append(&candidate("2024-01-01", "-1", "A", "")).unwrap();
        store.append(&candidate("2024-01-02", "-2", "B", "")).unwrap();
        let snapshot = store.backup().latest_valid().unwrap();

        env.write_ledger("\u{0}\u{1}this is not a ledger");
        let outcome = store.load_all().unwrap();
        match &outcome {
            LoadOutcome::Restored {
                snapshot: path,
                cause,
                ..
            } => {
                assert_eq!(path, snapshot.path());
                assert!(matches!(cause, Damage::Corrupt(_)));
            }
            other => panic!("expected a restore, got {other:?}"),
        }
        assert_eq!(categories(&outcome), ["A", "B"]);
        assert_eq!(env.read_ledger().as_bytes(), snapshot.contents());

        let again = store.load_all().unwrap();
        assert!(matches!(again, LoadOutcome::Clean { .. }));
        assert_eq!(again.len(), 2);
    }

    #[test]
    fn test_restore_when_file_is_missing() {
        let env = TestEnv::new();
        let store = env.store();
        store.append(&candidate("2024-01-01", "-1", "A", "")).unwrap();
        std::fs::remove_file(store.path()).unwrap();

        let outcome = store.load_all().unwrap();
        assert!(matches!(
            outcome,
            LoadOutcome::Restored {
                cause: Damage::Unreadable(_),
                ..
            }
        ));
        assert_eq!(categories(&outcome), ["A"]);
        assert!(matches!(
            store.load_all().unwrap(),
            LoadOutcome::Clean { .. }
        ));
    }

    #[test]
    fn test_restore_recovers_damaged_record() {
        let env = TestEnv::new();
        let store = env.store();
        for c in ["A", "B", "C"] {
            store.append(&candidate("2024-01-01", "-1", c, "")).unwrap();
        }
        let damaged = env.read_ledger().replace("2024-01-01,-1,B,", "2024-01-01,-1,B");
        env.write_ledger(&damaged);

        let outcome = store.load_all().unwrap();
        assert!(matches!(outcome, LoadOutcome::Restored { .. }));
        assert_eq!(categories(&outcome), ["A", "B", "C"]);
    }

    #[test]
    fn test_no_restore_when_snapshot_would_lose_records() {
        let env = TestEnv::new();
        let store = env.store();
        store.append(&candidate("2024-01-01", "-1", "A", "")).unwrap();
        store.append(&candidate("2024-01-02", "-2", "B", "")).unwrap();

        // Written behind the store's back, so no snapshot holds C.
        let mut contents = env.read_ledger();
        contents.push_str("2024-01-03,-3,C,\nbroken\n");
        env.write_ledger(&contents);

        let outcome = store.load_all().unwrap();
        assert!(outcome.is_degraded());
        assert_eq!(categories(&outcome), ["A", "B", "C"]);
        assert_eq!(env.read_ledger(), contents);
    }

    #[test]
    fn test_unrecoverable_without_snapshot() {
        let env = TestEnv::new();
        env.write_ledger("garbage\nmore garbage\n");
        let err = env.store().load_all().unwrap_err();
        assert!(matches!(err, LoadError::Unrecoverable { .. }), "{err:?}");
    }

    #[test]
    fn test_unrecoverable_when_missing_without_snapshot() {
        let env = TestEnv::new();
        std::fs::remove_file(env.config().ledger_path()).unwrap();
        let err = env.store().load_all().unwrap_err();
        assert!(matches!(err, LoadError::Unrecoverable { .. }), "{err:?}");
    }

    #[test]
    fn test_empty_ledger_is_clean() {
        let env = TestEnv::new();
        let outcome = env.store().load_all().unwrap();
        assert!(matches!(outcome, LoadOutcome::Clean { .. }));
        assert!(outcome.is_empty());
    }

    #[test]
    fn test_query_by_date_range() {
        let env = TestEnv::new();
        let store = env.store();
        for (d, c) in [
            ("2024-01-31", "Jan"),
            ("2024-02-01", "FebStart"),
            ("2024-02-15", "FebMid"),
            ("2024-02-29", "FebEnd"),
            ("2024-03-01", "Mar"),
        ] {
            store.append(&candidate(d, "-5", c, "")).unwrap();
        }

        let feb = store
            .query_by_date_range(date("2024-02-01"), date("2024-02-29"))
            .unwrap();
        let names: Vec<_> = feb.iter().map(|t| t.category()).collect();
        assert_eq!(names, ["FebStart", "FebMid", "FebEnd"]);

        let none = store
            .query_by_date_range(date("2024-03-01"), date("2024-01-01"))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_query_propagates_load_error() {
        let env = TestEnv::new();
        env.write_ledger("nothing useful");
        let err = env
            .store()
            .query_by_date_range(date("2024-01-01"), date("2024-12-31"))
            .unwrap_err();
        assert!(matches!(err, LoadError::Unrecoverable { .. }));
    }

    #[test]
    fn test_rewrite_replaces_contents() {
        let env = TestEnv::new();
        let store = env.store();
        store.append(&candidate("2024-01-01", "-1", "A", "")).unwrap();
        store.append(&candidate("2024-01-02", "-2", "B", "")).unwrap();

        let kept = vec![
            tx("2024-01-02", "-2", "B", ""),
            tx("2024-01-03", "3", "C", "with, comma\nand newline"),
        ];
        store.rewrite(&kept).unwrap();

        let outcome = store.load_all().unwrap();
        assert!(matches!(outcome, LoadOutcome::Clean { .. }));
        assert_eq!(outcome.into_transactions(), kept);

        // No temporary files are left next to the ledger.
        let leftovers: Vec<_> = std::fs::read_dir(env.config().root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");

        let latest = store.backup().latest_valid().unwrap();
        assert_eq!(latest.transactions(), kept.as_slice());
    }

    #[test]
    fn test_rewrite_into_missing_directory_fails_cleanly() {
        let env = TestEnv::new();
        let blocker = env.config().root().join("blocker");
        std::fs::write(&blocker, "a file, not a directory").unwrap();
        let store = Store::with_settings(
            blocker.join("ledger.csv"),
            ISO_DATE,
            env.config().backup(),
        );
        let err = store.rewrite(&[tx("2024-01-01", "1", "A", "")]).unwrap_err();
        assert!(matches!(err, WriteError::Io { .. }), "{err:?}");
    }

    #[test]
    fn test_check_does_not_recover() {
        let env = TestEnv::new();
        let store = env.store();
        store.append(&candidate("2024-01-01", "-1", "A", "")).unwrap();
        env.write_ledger(format!("{HEADER}\nbad line\n"));

        let report = store.check().unwrap();
        assert_eq!(report.valid_count, 0);
        assert_eq!(report.corrupt_lines[0].line, 2);
        assert_eq!(env.read_ledger(), format!("{HEADER}\nbad line\n"));

        std::fs::remove_file(store.path()).unwrap();
        assert!(matches!(
            store.check().unwrap_err(),
            LoadError::Unreadable { .. }
        ));
    }

    #[test]
    fn test_restore_latest() {
        let env = TestEnv::new();
        let store = env.store();
        assert!(matches!(
            store.restore_latest().unwrap_err(),
            LoadError::Unrecoverable { .. }
        ));

        store.append(&candidate("2024-01-01", "-1", "A", "")).unwrap();
        let expected = env.read_ledger();
        env.write_ledger(format!("{HEADER}\n"));
        let handle = store.restore_latest().unwrap();
        assert_eq!(handle.transactions().len(), 1);
        assert_eq!(env.read_ledger(), expected);
    }

    #[test]
    fn test_create_is_idempotent() {
        let env = TestEnv::new();
        let store = env.store();
        store.append(&candidate("2024-01-01", "-1", "A", "")).unwrap();
        let before = env.read_ledger();
        assert!(!store.create().unwrap());
        assert_eq!(env.read_ledger(), before);
    }

    #[test]
    fn test_retention_through_store() {
        let env = TestEnv::with_settings(2, ISO_DATE);
        let store = env.store();
        for c in ["A", "B", "C"] {
            store.append(&candidate("2024-01-01", "-1", c, "")).unwrap();
        }
        assert_eq!(env.snapshot_files().len(), 2);
        let latest = store.backup().latest_valid().unwrap();
        assert_eq!(latest.transactions().len(), 3);
    }

    #[test]
    fn test_is_subsequence() {
        let a = tx("2024-01-01", "-1", "A", "");
        let b = tx("2024-01-01", "-1", "B", "");
        let c = tx("2024-01-01", "-1", "C", "");
        let all = [a.clone(), b.clone(), c.clone()];
        assert!(is_subsequence(&[], &all));
        assert!(is_subsequence(&[a.clone(), c.clone()], &all));
        assert!(!is_subsequence(&[c.clone(), a.clone()], &all));
        assert!(!is_subsequence(&[a.clone(), a], &all));
    }
}
