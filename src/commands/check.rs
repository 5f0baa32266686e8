use crate::commands::Out;
use crate::integrity::IntegrityReport;
use crate::{Config, Result};
use anyhow::Context;

/// Reports damaged lines in the ledger file. Nothing is repaired.
pub fn check(config: &Config) -> Result<Out<IntegrityReport>> {
    let report = config
        .store()
        .check()
        .context("Unable to check the ledger")?;
    let message = if report.is_clean() {
        format!(
            "The ledger is intact with {} record(s)",
            report.valid_count
        )
    } else {
        format!("The ledger is damaged: {report}")
    };
    Ok(Out::new(message, report))
}
