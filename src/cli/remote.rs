//! Remote store read-back and reset

use clap::Args;
use std::sync::Arc;

use super::scrape::status_json;
use super::{Cli, CliError, OutputFormat};
use crate::config::ENV_REMOTE_URL;
use crate::sync::{RemoteHttpClient, RemoteRecord, SyncClient, SyncState};

/// Remote subcommand
#[derive(Debug, Args)]
pub struct RemoteCommand {
    #[command(subcommand)]
    action: RemoteAction,
}

#[derive(Debug, clap::Subcommand)]
enum RemoteAction {
    /// Print records stored on the remote
    List {
        /// Maximum records to fetch
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Delete every record on the remote and reset the local sync state
    Clear {
        /// Confirm the reset
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

impl RemoteCommand {
    /// Execute the remote command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = cli.load_config()?;
        if !config.remote.is_configured() {
            return Err(CliError::InvalidArgument(format!(
                "no remote configured (set remote.base_url or {ENV_REMOTE_URL})"
            )));
        }

        let remote = RemoteHttpClient::new(config.remote.clone())?;
        let client = SyncClient::new(Arc::new(remote)).with_retry(config.retry.policy());

        match &self.action {
            RemoteAction::List { limit } => {
                let records = client.read_back(*limit).await?;
                match cli.output_format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                    OutputFormat::Human => print_records(&records),
                }
            }
            RemoteAction::Clear { yes } => {
                if !yes {
                    return Err(CliError::InvalidArgument(
                        "refusing to clear the remote without --yes".to_string(),
                    ));
                }
                let state_path = config.sync_state_path();
                let mut state = SyncState::load(&state_path)?;
                client.clear_remote(&mut state).await?;
                state.save(&state_path)?;

                let message = "remote cleared, next scrape resends everything";
                match cli.output_format {
                    OutputFormat::Json => println!("{}", status_json(true, message)),
                    OutputFormat::Human => println!("✓ {message}"),
                }
            }
        }
        Ok(())
    }
}

fn print_records(records: &[RemoteRecord]) {
    println!("{} records on the remote", records.len());
    for record in records {
        let field = |name: &str| {
            record
                .fields
                .get(name)
                .map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| crate::UNKNOWN.to_string())
        };
        println!(
            "  {:<16} {} {} {} ${}",
            record.id,
            field("year"),
            field("make"),
            field("model"),
            field("price")
        );
    }
}
