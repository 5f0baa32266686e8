use crate::args::InitArgs;
use crate::commands::Out;
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the ledger home directory, its `config.json`, the backups directory and an empty
/// ledger file.
///
/// # Arguments
/// - `ledger_home` - The directory that will be the root of the data directory, e.g.
///   `$HOME/ledger`
/// - `args` - Optional backup retention and date format.
///
/// # Errors
/// - Returns an error if a config already exists, if the settings are invalid, or if any file
///   operation fails.
pub fn init(ledger_home: &Path, args: &InitArgs) -> Result<Out<()>> {
    let config = Config::create(ledger_home, args.backup_copies(), args.date_format())
        .context("Unable to create the ledger home and config")?;
    Ok(format!(
        "Successfully created the ledger at {}",
        config.ledger_path().display()
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("ledger");
        let out = init(&home, &InitArgs::new(Some(2), Some("%d/%m/%Y".into()))).unwrap();
        assert!(out.message().contains("ledger.csv"));

        let config = Config::load(&home).unwrap();
        assert_eq!(config.backup_copies(), 2);
        assert_eq!(config.date_format(), "%d/%m/%Y");
        assert!(config.ledger_path().is_file());
    }

    #[test]
    fn test_init_rejects_bad_date_format() {
        let dir = TempDir::new().unwrap();
        let err = init(dir.path(), &InitArgs::new(None, Some("%Y".into()))).unwrap_err();
        assert!(format!("{err:#}").contains("date_format"), "{err:#}");
    }
}
