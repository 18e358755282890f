//! Remote synchronization
//!
//! Pushes the snapshot to the remote CMS incrementally: only records whose
//! content hash differs from the last confirmed sync are sent, in bounded
//! batches. A failed batch never aborts the others, and the sync state only
//! advances for ids the remote confirmed.

use serde::Serialize;

pub mod client;
pub mod remote;
pub mod state;

pub use client::SyncClient;
pub use remote::{BatchOutcome, RemoteApi, RemoteError, RemoteHttpClient, RemoteRecord};
pub use state::{SyncEntry, SyncState};

/// A record the remote did not confirm
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRecord {
    /// Listing id
    pub id: String,
    /// Remote rejection reason or transport error
    pub reason: String,
}

/// Outcome of one sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Records in the delta (sent or attempted)
    pub attempted: usize,
    /// Records skipped because they were unchanged since the last sync
    pub unchanged: usize,
    /// Ids the remote confirmed
    pub accepted: Vec<String>,
    /// Ids that were rejected or never confirmed
    pub failed: Vec<FailedRecord>,
    /// Batches sent
    pub batches: usize,
    /// Batches that failed as a whole (transport exhausted)
    pub failed_batches: usize,
}

impl SyncReport {
    /// Ids in `failed`
    pub fn failed_ids(&self) -> Vec<String> {
        self.failed.iter().map(|f| f.id.clone()).collect()
    }
}

/// Sync errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Some records were not confirmed; the report covers the whole run
    #[error("{} of {} records failed to sync", .failed_ids.len(), .report.attempted)]
    Partial {
        /// Ids that were not confirmed
        failed_ids: Vec<String>,
        /// Full run report
        report: SyncReport,
    },

    /// Sync state could not be loaded or saved
    #[error("sync state error: {0}")]
    State(String),

    /// Remote call failed outright
    #[error("remote transport error: {0}")]
    Transport(#[from] RemoteError),
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
