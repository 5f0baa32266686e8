//! Configuration file handling for the ledger.
//!
//! The configuration file is stored at `$LEDGER_HOME/config.json` and holds the backup retention,
//! the date format accepted from people, and optional overrides for where the canonical ledger
//! file and the backups directory live.

use crate::backup::Backup;
use crate::model::ISO_DATE;
use crate::store::Store;
use crate::{fs, Result};
use anyhow::{bail, ensure, Context};
use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_NAME: &str = "ledger";
const CONFIG_VERSION: u8 = 1;
pub const BACKUP_COPIES: u32 = 5;
const BACKUPS: &str = ".backups";
const CONFIG_JSON: &str = "config.json";
const LEDGER_CSV: &str = "ledger.csv";

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$LEDGER_HOME` and from there it loads `$LEDGER_HOME/config.json`. It provides
/// the paths of the canonical ledger file and the backups directory, resolved against the home
/// directory when they are relative.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    ledger_path: PathBuf,
    backups: PathBuf,
}

impl Config {
    /// Creates the home directory and its backups directory, writes an initial `config.json`
    /// and creates an empty canonical ledger file (header only) if none exists yet.
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the root of the data directory, e.g. `$HOME/ledger`
    /// - `backup_copies` - How many snapshots to keep. Defaults to 5.
    /// - `date_format` - The `strftime` format accepted for dates typed by a person. Defaults to
    ///   `%Y-%m-%d`.
    ///
    /// # Errors
    /// - Returns an error if a config file already exists, if the settings are invalid, or if any
    ///   file operation fails.
    pub fn create(
        dir: impl Into<PathBuf>,
        backup_copies: Option<u32>,
        date_format: Option<&str>,
    ) -> Result<Self> {
        let maybe_relative = dir.into();
        fs::create_dir_all(&maybe_relative).context("Unable to create the ledger home directory")?;
        let root = fs::canonicalize(&maybe_relative)?;

        let config_path = root.join(CONFIG_JSON);
        if config_path.exists() {
            bail!(
                "A config file already exists at '{}'",
                config_path.display()
            )
        }

        let config_file = ConfigFile {
            backup_copies: backup_copies.unwrap_or(BACKUP_COPIES),
            date_format: date_format.unwrap_or(ISO_DATE).to_string(),
            ..ConfigFile::default()
        };
        config_file.validate()?;
        config_file.save(&config_path)?;

        let config = Self::from_parts(root, config_path, config_file);
        fs::create_dir_all(config.backups())?;
        config
            .store()
            .create()
            .context("Unable to create the ledger file")?;
        debug!("Created ledger home at {}", config.root().display());
        Ok(config)
    }

    /// This will
    /// - validate that `ledger_home` exists and that the config file exists
    /// - load and validate the config file
    /// - create the backups directory if it has gone missing
    /// - return the loaded configuration object
    pub fn load(ledger_home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = ledger_home.into();
        let root = fs::canonicalize(&maybe_relative).context("Ledger home is missing")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path)?;

        let config = Self::from_parts(root, config_path, config_file);
        fs::create_dir_all(config.backups())?;
        Ok(config)
    }

    fn from_parts(root: PathBuf, config_path: PathBuf, config_file: ConfigFile) -> Self {
        let ledger_path = resolve(&root, config_file.ledger_path());
        let backups = resolve(&root, config_file.backups_path());
        Self {
            root,
            config_path,
            config_file,
            ledger_path,
            backups,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// The canonical ledger file.
    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    pub fn backups(&self) -> &Path {
        &self.backups
    }

    pub fn backup_copies(&self) -> u32 {
        self.config_file.backup_copies
    }

    pub fn date_format(&self) -> &str {
        &self.config_file.date_format
    }

    /// Creates a new `Backup` instance for managing snapshot files.
    pub fn backup(&self) -> Backup {
        Backup::new(self)
    }

    /// Creates a new `Store` for the canonical ledger file.
    pub fn store(&self) -> Store {
        Store::new(self)
    }
}

/// Returns `p` unchanged if it is absolute, otherwise joins it onto `root`.
fn resolve(root: &Path, p: PathBuf) -> PathBuf {
    if p.is_absolute() {
        return p;
    }
    root.join(p)
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "ledger",
///   "config_version": 1,
///   "backup_copies": 5,
///   "date_format": "%d-%m-%Y",
///   "ledger_path": "ledger.csv",
///   "backups_path": ".backups"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "ledger"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    /// Number of snapshots to keep, at least 1
    #[serde(default = "default_backup_copies")]
    backup_copies: u32,

    /// The `strftime` format used to parse dates entered by a person
    #[serde(default = "default_date_format")]
    date_format: String,

    /// Path to the canonical ledger file (optional, relative to $LEDGER_HOME or absolute)
    /// Defaults to $LEDGER_HOME/ledger.csv if not specified
    #[serde(skip_serializing_if = "Option::is_none")]
    ledger_path: Option<PathBuf>,

    /// Path to the backups directory (optional, relative to $LEDGER_HOME or absolute)
    /// Defaults to $LEDGER_HOME/.backups if not specified
    #[serde(skip_serializing_if = "Option::is_none")]
    backups_path: Option<PathBuf>,
}

fn default_backup_copies() -> u32 {
    BACKUP_COPIES
}

fn default_date_format() -> String {
    ISO_DATE.to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            backup_copies: BACKUP_COPIES,
            date_format: ISO_DATE.to_string(),
            ledger_path: None,
            backups_path: None,
        }
    }
}

impl ConfigFile {
    /// Loads and validates a ConfigFile from the specified path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if a setting is invalid
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;

        let config: ConfigFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file at {}", path.display()))?;
        Ok(config)
    }

    /// Saves the ConfigFile to the specified path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        fs::write(p, data).context("Unable to write config file")
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            self.app_name
        );
        ensure!(
            self.backup_copies >= 1,
            "backup_copies must be at least 1, got {}",
            self.backup_copies
        );
        check_date_format(&self.date_format)
    }

    #[cfg(test)]
    fn new(
        backup_copies: u32,
        date_format: &str,
        ledger_path: Option<PathBuf>,
        backups_path: Option<PathBuf>,
    ) -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            backup_copies,
            date_format: date_format.to_string(),
            ledger_path,
            backups_path,
        }
    }

    fn ledger_path(&self) -> PathBuf {
        self.ledger_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(LEDGER_CSV))
    }

    fn backups_path(&self) -> PathBuf {
        self.backups_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(BACKUPS))
    }
}

/// A date format is usable when chrono understands every specifier and a date formatted with it
/// parses back to the same date.
fn check_date_format(format: &str) -> Result<()> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        bail!("Invalid date_format '{format}': unknown format specifier");
    }
    let probe = NaiveDate::from_ymd_opt(2024, 12, 31).context("Invalid probe date")?;
    let formatted = probe.format(format).to_string();
    match NaiveDate::parse_from_str(&formatted, format) {
        Ok(parsed) if parsed == probe => Ok(()),
        _ => bail!("Invalid date_format '{format}': it must include the year, month and day"),
    }
}
