//! These structs provide the CLI interface for the ledger CLI.

use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// ledger: A command-line tool for keeping a personal income and expense ledger.
///
/// Transactions are stored in a plain CSV file in your ledger home directory. Every change is
/// followed by a snapshot in the backups directory, and a damaged ledger file is restored from
/// the newest good snapshot when that can be done without losing records.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the ledger home directory, its config file and an empty ledger.
    ///
    /// This is the first command you should run. By default the ledger lives in $HOME/ledger;
    /// pass --ledger-home or set LEDGER_HOME to put it somewhere else.
    Init(InitArgs),
    /// Validate and append a transaction to the ledger.
    Add(AddArgs),
    /// List transactions, optionally limited to an inclusive date range.
    List(ListArgs),
    /// Check the ledger file for damaged lines without changing anything.
    Check,
    /// Replace the ledger file with the newest good snapshot.
    Restore,
    /// List the snapshots in the backups directory, oldest first.
    Backups,
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG. See the tracing-subscriber crate for instructions.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where the ledger and its configuration are held. Defaults to ~/ledger
    #[arg(long, env = "LEDGER_HOME", default_value_t = default_ledger_home())]
    ledger_home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, ledger_home: PathBuf) -> Self {
        Self {
            log_level,
            ledger_home: ledger_home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn ledger_home(&self) -> &DisplayPath {
        &self.ledger_home
    }
}

/// Args for the `ledger init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// How many snapshots to keep in the backups directory. Defaults to 5.
    #[arg(long)]
    backup_copies: Option<u32>,

    /// The strftime format for dates you type, e.g. "%d/%m/%Y". Defaults to "%Y-%m-%d". The
    /// ledger file itself always stores dates as YYYY-MM-DD.
    #[arg(long)]
    date_format: Option<String>,
}

impl InitArgs {
    pub fn new(backup_copies: Option<u32>, date_format: Option<String>) -> Self {
        Self {
            backup_copies,
            date_format,
        }
    }

    pub fn backup_copies(&self) -> Option<u32> {
        self.backup_copies
    }

    pub fn date_format(&self) -> Option<&str> {
        self.date_format.as_deref()
    }
}

/// Args for the `ledger add` command.
#[derive(Debug, Parser, Clone)]
pub struct AddArgs {
    /// The amount. Negative amounts are expenses, zero and positive amounts are income. A dollar
    /// sign and thousands separators are accepted, e.g. -$1,250.00
    #[arg(long, allow_hyphen_values = true)]
    amount: String,

    /// The category, e.g. Groceries. Must not be empty.
    #[arg(long)]
    category: String,

    /// The date in the configured date format. Defaults to today.
    #[arg(long)]
    date: Option<String>,

    /// An optional free-text description.
    #[arg(long)]
    description: Option<String>,
}

impl AddArgs {
    pub fn new(
        amount: impl Into<String>,
        category: impl Into<String>,
        date: Option<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            amount: amount.into(),
            category: category.into(),
            date,
            description,
        }
    }

    pub fn amount(&self) -> &str {
        &self.amount
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Args for the `ledger list` command.
#[derive(Debug, Default, Parser, Clone)]
pub struct ListArgs {
    /// The first date to include, in the configured date format.
    #[arg(long)]
    from: Option<String>,

    /// The last date to include, in the configured date format.
    #[arg(long)]
    to: Option<String>,
}

impl ListArgs {
    pub fn new(from: Option<String>, to: Option<String>) -> Self {
        Self { from, to }
    }

    /// The first date to include.
    pub fn start(&self) -> Option<&str> {
        self.from.as_deref()
    }

    /// The last date to include.
    pub fn end(&self) -> Option<&str> {
        self.to.as_deref()
    }
}

fn default_ledger_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("ledger"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --ledger-home or LEDGER_HOME instead of relying on the default \
                ledger home directory.",
            );
            PathBuf::from("ledger")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add() {
        let args = Args::try_parse_from([
            "ledger",
            "--ledger-home",
            "/tmp/somewhere",
            "add",
            "--amount",
            "-42.50",
            "--category",
            "Groceries",
            "--description",
            "Weekly shop",
        ])
        .unwrap();
        assert_eq!(args.common().ledger_home().path(), Path::new("/tmp/somewhere"));
        match args.command() {
            Command::Add(add) => {
                assert_eq!(add.amount(), "-42.50");
                assert_eq!(add.category(), "Groceries");
                assert_eq!(add.date(), None);
                assert_eq!(add.description(), Some("Weekly shop"));
            }
            other => panic!("expected add, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_list_range() {
        let args =
            Args::try_parse_from(["ledger", "list", "--from", "2024-02-01", "--to", "2024-02-29"])
                .unwrap();
        match args.command() {
            Command::List(list) => {
                assert_eq!(list.start(), Some("2024-02-01"));
                assert_eq!(list.end(), Some("2024-02-29"));
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_log_level() {
        let args = Args::try_parse_from(["ledger", "--log-level", "debug", "check"]).unwrap();
        assert_eq!(args.common().log_level(), LevelFilter::DEBUG);
        assert!(matches!(args.command(), Command::Check));
    }
}
