//! CLI command implementations

pub mod error;
pub mod remote;
pub mod scrape;
pub mod snapshot;

pub use error::CliError;
pub use remote::RemoteCommand;
pub use scrape::{Cli, Commands, OutputFormat, ScrapeArgs};
pub use snapshot::SnapshotCommand;
