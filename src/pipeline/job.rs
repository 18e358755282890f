//! Job structures and status tracking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{PipelineError, StopReason};
use crate::filter::FilterCriteria;

/// Job identifier, unique within one service instance
pub type JobId = u64;

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job created but not started
    #[default]
    Pending,
    /// Job is running
    Running,
    /// Pagination finished and the snapshot was persisted
    Succeeded,
    /// Snapshot could not be persisted, or every page failed
    Failed,
    /// Stopped at a page boundary on request
    Cancelled,
}

impl JobStatus {
    /// Lowercase label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job progress counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Pages fetched successfully
    pub pages_fetched: u32,
    /// Pages that failed to fetch or parse
    pub pages_failed: u32,
    /// Listings parsed across all pages
    pub records_parsed: usize,
    /// Cards skipped because no identifier could be derived
    pub records_skipped: usize,
    /// Rows in the snapshot after the merge
    pub records_written: usize,
    /// Listings the remote confirmed
    pub records_synced: usize,
    /// Listings the remote rejected or never confirmed
    pub records_sync_failed: usize,
    /// Detail pages fetched and merged
    pub details_fetched: usize,
    /// Detail pages that failed to fetch or parse
    pub details_failed: usize,
}

impl JobProgress {
    /// Pages attempted so far
    pub fn pages_attempted(&self) -> u32 {
        self.pages_fetched + self.pages_failed
    }
}

/// One execution of the pipeline.
///
/// Owned and mutated by the orchestrator task only; everyone else sees
/// cloned snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Identifier
    pub id: JobId,
    /// Scope of the scrape, immutable for the job's lifetime
    pub filter: FilterCriteria,
    /// Current status
    #[serde(default)]
    pub status: JobStatus,
    /// Progress counters
    #[serde(default)]
    pub progress: JobProgress,
    /// Why pagination stopped, once it has
    pub stop_reason: Option<StopReason>,
    /// Fatal conditions (set when the job failed)
    #[serde(default)]
    pub errors: Vec<String>,
    /// Non-fatal per-page and sync problems
    #[serde(default)]
    pub warnings: Vec<String>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the job started running
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// New pending job
    pub fn new(id: JobId, filter: FilterCriteria) -> Self {
        Self {
            id,
            filter,
            status: JobStatus::Pending,
            progress: JobProgress::default(),
            stop_reason: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// pending → running; resets the counters
    pub fn start(&mut self) -> Result<(), PipelineError> {
        self.transition(JobStatus::Running)?;
        self.progress = JobProgress::default();
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// running → succeeded
    pub fn succeed(&mut self) -> Result<(), PipelineError> {
        self.transition(JobStatus::Succeeded)
    }

    /// running → failed with `reason` added to the error list
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), PipelineError> {
        self.transition(JobStatus::Failed)?;
        self.errors.push(reason.into());
        Ok(())
    }

    /// running → cancelled
    pub fn cancel(&mut self) -> Result<(), PipelineError> {
        self.transition(JobStatus::Cancelled)
    }

    /// Attach a non-fatal warning
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), PipelineError> {
        let allowed = match (self.status, to) {
            (JobStatus::Pending, JobStatus::Running) => true,
            (JobStatus::Running, next) => next.is_terminal(),
            _ => false,
        };

        if !allowed {
            return Err(PipelineError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        self.status = to;
        if to.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }
}
