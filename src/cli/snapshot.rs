//! Snapshot inspection and restore

use clap::Args;

use super::scrape::status_json;
use super::{Cli, CliError, OutputFormat};
use crate::store::{RecordStore, SnapshotMetadata};

/// Snapshot subcommand
#[derive(Debug, Args)]
pub struct SnapshotCommand {
    #[command(subcommand)]
    action: SnapshotAction,
}

#[derive(Debug, clap::Subcommand)]
enum SnapshotAction {
    /// Show row count, size and age of the snapshot
    Info,

    /// Replace the snapshot with its backup from before the last write
    Restore,
}

impl SnapshotCommand {
    /// Execute the snapshot command
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = cli.load_config()?;
        let store = RecordStore::new(config.snapshot_path);

        match self.action {
            SnapshotAction::Info => {
                let metadata = store.metadata()?;
                match cli.output_format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&metadata)?),
                    OutputFormat::Human => print_metadata(&metadata),
                }
            }
            SnapshotAction::Restore => {
                let rows = store.restore_backup()?;
                let message = format!("restored {rows} rows from {}", store.backup_path().display());
                match cli.output_format {
                    OutputFormat::Json => println!("{}", status_json(true, &message)),
                    OutputFormat::Human => println!("✓ {message}"),
                }
            }
        }
        Ok(())
    }
}

fn print_metadata(metadata: &SnapshotMetadata) {
    println!("Snapshot: {}", metadata.path.display());
    if !metadata.exists {
        println!("  (not written yet)");
        return;
    }
    println!("  Rows:     {}", metadata.rows);
    println!("  Size:     {} bytes", metadata.size_bytes);
    if let Some(modified) = metadata.modified {
        println!("  Modified: {}", modified.to_rfc3339());
    }
    println!(
        "  Backup:   {}",
        if metadata.backup_present { "available" } else { "none" }
    );
}
