use crate::backup::SnapshotInfo;
use crate::commands::Out;
use crate::{Config, Result};
use anyhow::Context;

/// Lists the snapshots in the backups directory, oldest first.
pub fn backups(config: &Config) -> Result<Out<Vec<SnapshotInfo>>> {
    let snapshots = config
        .backup()
        .list()
        .context("Unable to list the snapshots")?;

    let mut message = format!(
        "{} snapshot(s) in {}",
        snapshots.len(),
        config.backups().display()
    );
    for info in &snapshots {
        match &info.manifest {
            Some(manifest) => message.push_str(&format!(
                "\n{}  {} record(s)  {} bytes  {}",
                info.name,
                manifest.records,
                manifest.bytes,
                manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            )),
            None => message.push_str(&format!("\n{}  (no manifest)", info.name)),
        }
    }
    Ok(Out::new(message, snapshots))
}
