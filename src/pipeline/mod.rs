//! Job orchestration
//!
//! A [`Job`] moves `pending → running → {succeeded, failed, cancelled}`. The
//! [`Orchestrator`] owns the job while it runs and publishes snapshots of it
//! through a `tokio::sync::watch` channel; nobody else mutates it.

pub mod job;
pub mod orchestrator;
pub mod pagination;

pub use job::{Job, JobId, JobProgress, JobStatus};
pub use orchestrator::{Orchestrator, SyncStage};
pub use pagination::{PageBudget, StopReason};

use crate::fetcher::FetchError;
use crate::sync::RemoteError;

/// Pipeline errors
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Status change not allowed by the job lifecycle
    #[error("invalid job transition from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: JobStatus,
        /// Requested status
        to: JobStatus,
    },

    /// Listing site client could not be built
    #[error("fetcher setup failed: {0}")]
    Fetcher(#[from] FetchError),

    /// Remote client could not be built
    #[error("remote setup failed: {0}")]
    Remote(#[from] RemoteError),
}
