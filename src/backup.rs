//! Snapshot management for the canonical ledger file.
//!
//! Every successful mutation of the ledger is followed by a snapshot: a byte-for-byte copy of the
//! canonical file named `ledger.YYYY-MM-DD-NNN.csv`, where NNN is a sequence number, plus a
//! manifest `ledger.YYYY-MM-DD-NNN.json` recording the record count, the length and a CRC-32
//! of the copy. Snapshots are ordered by the date and sequence number in their names, never by
//! file timestamps, and a snapshot file is never overwritten once written.

use crate::error::BackupError;
use crate::model::{Transaction, ISO_DATE};
use crate::{integrity, Config, Result};
use anyhow::{ensure, Context};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Prefix for snapshot files.
pub const PREFIX: &str = "ledger";

const DATA_EXTENSION: &str = "csv";
const MANIFEST_EXTENSION: &str = "json";

/// Manages snapshot creation, rotation and lookup.
///
/// The `Backup` struct is immutable and owns copies of the paths and settings it needs.
/// Create a new instance via `Config::backup()` or `Backup::new()`.
#[derive(Debug, Clone)]
pub struct Backup {
    backups_dir: PathBuf,
    backup_copies: u32,
}

/// Orders snapshots: by date, then by the sequence number within that date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SnapshotKey {
    date: NaiveDate,
    sequence: u32,
}

impl SnapshotKey {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    fn stem(&self) -> String {
        format!("{PREFIX}.{}-{:03}", self.date.format(ISO_DATE), self.sequence)
    }

    fn data_file_name(&self) -> String {
        format!("{}.{DATA_EXTENSION}", self.stem())
    }

    fn manifest_file_name(&self) -> String {
        format!("{}.{MANIFEST_EXTENSION}", self.stem())
    }
}

impl Display for SnapshotKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.data_file_name())
    }
}

/// The sidecar written next to each snapshot so that a damaged copy can be told apart from a
/// faithful one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Number of valid records in the snapshot.
    pub records: usize,
    /// Length of the snapshot in bytes.
    pub bytes: u64,
    /// CRC-32 (IEEE) of the snapshot bytes.
    pub crc32: u32,
    pub created_at: DateTime<Utc>,
}

impl Manifest {
    fn describe(contents: &[u8]) -> Self {
        Self {
            records: integrity::check(contents).report.valid_count,
            bytes: contents.len() as u64,
            crc32: crc32fast::hash(contents),
            created_at: Utc::now(),
        }
    }
}

/// A snapshot that has been read and found to be internally consistent.
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
    path: PathBuf,
    key: SnapshotKey,
    contents: Vec<u8>,
    transactions: Vec<Transaction>,
}

impl SnapshotHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> SnapshotKey {
        self.key
    }

    /// The exact bytes of the snapshot.
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    /// The records in the snapshot, in file order.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }
}

/// Summary of a snapshot on disk, as listed by [`Backup::list`].
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub name: String,
    pub path: PathBuf,
    pub key: SnapshotKey,
    /// `None` when the manifest is missing or unreadable.
    pub manifest: Option<Manifest>,
}

impl Backup {
    /// Creates a new `Backup` instance from a `Config`.
    pub fn new(config: &Config) -> Self {
        Self::with_settings(config.backups(), config.backup_copies())
    }

    /// Creates a new `Backup` instance for `backups_dir` keeping `backup_copies` snapshots.
    pub fn with_settings(backups_dir: impl Into<PathBuf>, backup_copies: u32) -> Self {
        Self {
            backups_dir: backups_dir.into(),
            backup_copies: backup_copies.max(1),
        }
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Writes `contents` as a new snapshot with its manifest, then deletes the oldest snapshots
    /// beyond the retention count.
    ///
    /// Returns a handle to the snapshot that was written.
    pub fn snapshot(&self, contents: &[u8]) -> std::result::Result<SnapshotHandle, BackupError> {
        std::fs::create_dir_all(&self.backups_dir)
            .map_err(|e| BackupError::io(&self.backups_dir, e))?;

        let key = self.next_key(today())?;
        let path = self.backups_dir.join(key.data_file_name());
        let manifest_path = self.backups_dir.join(key.manifest_file_name());

        let manifest = Manifest::describe(contents);
        let manifest_json =
            serde_json::to_vec_pretty(&manifest).map_err(|source| BackupError::Manifest {
                path: manifest_path.clone(),
                source,
            })?;

        self.write_new(&path, contents)?;
        self.write_new(&manifest_path, &manifest_json)?;
        debug!(
            "Saved snapshot {} ({} records)",
            path.display(),
            manifest.records
        );

        self.rotate()?;

        Ok(SnapshotHandle {
            path,
            key,
            contents: contents.to_vec(),
            transactions: integrity::check(contents).transactions,
        })
    }

    /// Returns the newest snapshot that is internally consistent: its manifest (when there is
    /// one) matches its bytes and the integrity check finds no damaged lines. Damaged snapshots
    /// are skipped, walking back through history until one validates or none are left.
    pub fn latest_valid(&self) -> Option<SnapshotHandle> {
        let keys = match self.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Unable to list snapshots: {e}");
                return None;
            }
        };

        for key in keys.into_iter().rev() {
            match self.verify(key) {
                Ok(handle) => return Some(handle),
                Err(e) => warn!("Skipping snapshot {key}: {e:#}"),
            }
        }
        None
    }

    /// Lists the snapshots on disk, oldest first.
    pub fn list(&self) -> std::result::Result<Vec<SnapshotInfo>, BackupError> {
        Ok(self
            .keys()?
            .into_iter()
            .map(|key| SnapshotInfo {
                name: key.data_file_name(),
                path: self.backups_dir.join(key.data_file_name()),
                key,
                manifest: self.read_manifest(key).ok().flatten(),
            })
            .collect())
    }

    /// Returns the key for a new snapshot. Sequence numbers restart each day, but if the newest
    /// existing snapshot is dated after `today` (the clock moved backwards) its date is reused so
    /// that the new snapshot still sorts last.
    fn next_key(&self, today: NaiveDate) -> std::result::Result<SnapshotKey, BackupError> {
        let key = match self.keys()?.last() {
            Some(latest) if latest.date >= today => SnapshotKey {
                date: latest.date,
                sequence: latest
                    .sequence
                    .checked_add(1)
                    .ok_or(BackupError::SequenceExhausted { date: latest.date })?,
            },
            _ => SnapshotKey {
                date: today,
                sequence: 1,
            },
        };
        Ok(key)
    }

    /// Returns the keys of all snapshot data files, sorted oldest first.
    fn keys(&self) -> std::result::Result<Vec<SnapshotKey>, BackupError> {
        let dir = match std::fs::read_dir(&self.backups_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackupError::io(&self.backups_dir, e)),
        };

        let mut keys = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| BackupError::io(&self.backups_dir, e))?;
            let file_name = entry.file_name();
            if let Some(key) = parse_key(&file_name.to_string_lossy()) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Deletes the oldest snapshots (and their manifests), keeping only `backup_copies`. If none
    /// of the kept snapshots is consistent, the newest consistent older one is kept as well.
    fn rotate(&self) -> std::result::Result<(), BackupError> {
        let keys = self.keys()?;
        let to_delete = keys.len().saturating_sub(self.backup_copies as usize);
        if to_delete == 0 {
            return Ok(());
        }
        let (old, kept) = keys.split_at(to_delete);
        let spare = if kept.iter().rev().any(|key| self.verify(*key).is_ok()) {
            None
        } else {
            old.iter().rev().copied().find(|key| self.verify(*key).is_ok())
        };
        if let Some(spare) = spare {
            warn!("Keeping {spare} beyond the retention count, it is the newest good snapshot");
        }

        for key in old.iter().copied().filter(|key| Some(*key) != spare) {
            for name in [key.data_file_name(), key.manifest_file_name()] {
                let path = self.backups_dir.join(name);
                match std::fs::remove_file(&path) {
                    Ok(()) => debug!("Removed old snapshot file {}", path.display()),
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(BackupError::io(path, e)),
                }
            }
        }
        Ok(())
    }

    /// Writes `contents` to a temporary file in the backups directory and moves it to `path`,
    /// failing if `path` already exists.
    fn write_new(&self, path: &Path, contents: &[u8]) -> std::result::Result<(), BackupError> {
        let mut tmp =
            NamedTempFile::new_in(&self.backups_dir).map_err(|e| BackupError::io(path, e))?;
        tmp.write_all(contents)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| BackupError::io(tmp.path(), e))?;
        tmp.persist_noclobber(path).map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                BackupError::Exists {
                    path: path.to_path_buf(),
                }
            } else {
                BackupError::io(path, e.error)
            }
        })?;
        Ok(())
    }

    fn read_manifest(&self, key: SnapshotKey) -> Result<Option<Manifest>> {
        let path = self.backups_dir.join(key.manifest_file_name());
        let json = match std::fs::read(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Unable to read {}", path.display()))
            }
        };
        let manifest = serde_json::from_slice(&json)
            .with_context(|| format!("Unable to parse manifest {}", path.display()))?;
        Ok(Some(manifest))
    }

    /// Reads a snapshot and checks it against its manifest and the integrity checker.
    fn verify(&self, key: SnapshotKey) -> Result<SnapshotHandle> {
        let path = self.backups_dir.join(key.data_file_name());
        let contents = std::fs::read(&path)
            .with_context(|| format!("Unable to read snapshot {}", path.display()))?;

        let manifest = self.read_manifest(key)?;
        match &manifest {
            Some(manifest) => {
                ensure!(
                    manifest.bytes == contents.len() as u64,
                    "length {} does not match the manifest ({})",
                    contents.len(),
                    manifest.bytes
                );
                ensure!(
                    manifest.crc32 == crc32fast::hash(&contents),
                    "checksum does not match the manifest"
                );
            }
            None => debug!("Snapshot {key} has no manifest, relying on the integrity check"),
        }

        let scan = integrity::check(&contents);
        ensure!(
            scan.report.is_clean(),
            "integrity check failed: {}",
            scan.report
        );
        if let Some(manifest) = manifest {
            ensure!(
                manifest.records == scan.report.valid_count,
                "{} records found but the manifest lists {}",
                scan.report.valid_count,
                manifest.records
            );
        }

        Ok(SnapshotHandle {
            path,
            key,
            contents,
            transactions: scan.transactions,
        })
    }
}

/// Returns today's local date.
fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parses the key from a snapshot data file name such as `ledger.2025-12-14-001.csv`.
/// Returns None for manifests, temporary files and anything else.
fn parse_key(filename: &str) -> Option<SnapshotKey> {
    let rest = filename
        .strip_prefix(PREFIX)?
        .strip_prefix('.')?
        .strip_suffix(DATA_EXTENSION)?
        .strip_suffix('.')?;

    // YYYY-MM-DD-NNN
    let (date, digits) = rest.rsplit_once('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let key = SnapshotKey {
        date: NaiveDate::parse_from_str(date, ISO_DATE).ok()?,
        sequence: digits.parse().ok()?,
    };
    // Only the name this key would be written under, so `-1` and `-0001` never alias `-001`.
    (key.data_file_name() == filename).then_some(key)
}
