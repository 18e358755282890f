//! CLI error types and conversions

use crate::config::ConfigError;
use crate::filter::FilterError;
use crate::service::ServiceError;
use crate::store::PersistError;
use crate::sync::{RemoteError, SyncError};

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Filter error
    #[error("filter error: {0}")]
    Filter(#[from] FilterError),

    /// Service error
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// Snapshot error
    #[error("snapshot error: {0}")]
    Persist(#[from] PersistError),

    /// Sync error
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Remote error
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Output could not be rendered
    #[error("output error: {0}")]
    Output(#[from] serde_json::Error),

    /// Job ended in the failed state
    #[error("job {id} failed: {reason}")]
    JobFailed {
        /// Job id
        id: u64,
        /// Joined error list
        reason: String,
    },

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
