use crate::commands::Out;
use crate::{Config, Result};
use anyhow::Context;
use serde::Serialize;
use std::path::PathBuf;

/// The snapshot that `ledger restore` copied over the ledger file.
#[derive(Debug, Clone, Serialize)]
pub struct Restored {
    pub snapshot: PathBuf,
    pub records: usize,
}

/// Replaces the ledger file with the newest good snapshot.
pub fn restore(config: &Config) -> Result<Out<Restored>> {
    let snapshot = config
        .store()
        .restore_latest()
        .context("Unable to restore the ledger")?;
    let restored = Restored {
        snapshot: snapshot.path().to_path_buf(),
        records: snapshot.transactions().len(),
    };
    Ok(Out::new(
        format!(
            "Restored {} record(s) from {}",
            restored.records,
            restored.snapshot.display()
        ),
        restored,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Candidate;
    use crate::test::TestEnv;

    #[test]
    fn test_restore() {
        let env = TestEnv::new();
        env.store()
            .append(&Candidate::new("2024-01-01", "5", "Gift", ""))
            .unwrap();
        let good = env.read_ledger();
        env.write_ledger("garbage");

        let out = restore(&env.config()).unwrap();
        assert_eq!(out.structure().unwrap().records, 1);
        assert_eq!(env.read_ledger(), good);
    }

    #[test]
    fn test_restore_without_snapshots() {
        let env = TestEnv::new();
        let err = restore(&env.config()).unwrap_err();
        assert!(format!("{err:#}").contains("no valid snapshot"), "{err:#}");
    }
}
