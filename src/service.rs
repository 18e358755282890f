//! Single-job service facade
//!
//! Front-ends start, watch and cancel jobs through [`ScrapeService`]. At most
//! one job runs at a time; a start request while one is running is rejected.
//! The last job stays visible until the next one replaces it or it is
//! cleared.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cancel::{CancelSignal, SharedCancel};
use crate::config::PipelineConfig;
use crate::filter::{FilterCriteria, FilterError};
use crate::pipeline::{Job, JobId, Orchestrator, PipelineError};
use crate::store::{PersistError, SnapshotMetadata};

/// Service errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Filter failed validation
    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),

    /// Another job is still running
    #[error("job {id} is still running")]
    JobAlreadyRunning {
        /// Running job
        id: JobId,
    },

    /// Pipeline could not be built
    #[error(transparent)]
    Setup(#[from] PipelineError),

    /// Snapshot could not be inspected
    #[error(transparent)]
    Persist(#[from] PersistError),
}

struct ActiveJob {
    id: JobId,
    cancel: SharedCancel,
    updates: watch::Receiver<Job>,
}

impl ActiveJob {
    fn snapshot(&self) -> Job {
        self.updates.borrow().clone()
    }

    fn is_running(&self) -> bool {
        !self.updates.borrow().status.is_terminal()
    }
}

/// Owns the current job slot
pub struct ScrapeService {
    orchestrator: Arc<Orchestrator>,
    slot: Mutex<Option<ActiveJob>>,
    next_id: AtomicU64,
}

impl ScrapeService {
    /// Service around an existing orchestrator
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            slot: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Build the whole pipeline from `config`
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ServiceError> {
        Ok(Self::new(Orchestrator::from_config(config)?))
    }

    fn slot(&self) -> MutexGuard<'_, Option<ActiveJob>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate `filter` and spawn a job for it on the current runtime.
    ///
    /// # Errors
    /// [`ServiceError::InvalidFilter`] or [`ServiceError::JobAlreadyRunning`].
    pub fn start(&self, filter: FilterCriteria) -> Result<JobId, ServiceError> {
        filter.validate()?;

        let mut slot = self.slot();
        if let Some(active) = slot.as_ref().filter(|a| a.is_running()) {
            warn!(running = active.id, "Start rejected, a job is already running");
            return Err(ServiceError::JobAlreadyRunning { id: active.id });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let job = Job::new(id, filter);
        let (tx, rx) = watch::channel(job.clone());
        let cancel = CancelSignal::shared();

        let orchestrator = Arc::clone(&self.orchestrator);
        let task_cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            orchestrator.run(job, &task_cancel, &tx).await;
        });

        info!(job_id = id, "Job accepted");
        *slot = Some(ActiveJob {
            id,
            cancel,
            updates: rx,
        });
        Ok(id)
    }

    /// Latest snapshot of the current (or last) job
    pub fn status(&self) -> Option<Job> {
        self.slot().as_ref().map(ActiveJob::snapshot)
    }

    /// Ask the running job to stop at its next page boundary.
    ///
    /// Returns false when nothing is running.
    pub fn cancel(&self) -> bool {
        match self.slot().as_ref().filter(|a| a.is_running()) {
            Some(active) => {
                info!(job_id = active.id, "Cancellation requested");
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Forget a finished job. Returns whether there was one.
    ///
    /// # Errors
    /// [`ServiceError::JobAlreadyRunning`] while the job is still running.
    pub fn clear(&self) -> Result<bool, ServiceError> {
        let mut slot = self.slot();
        if let Some(active) = slot.as_ref().filter(|a| a.is_running()) {
            return Err(ServiceError::JobAlreadyRunning { id: active.id });
        }
        Ok(slot.take().is_some())
    }

    /// Wait for the current job to reach a terminal state.
    ///
    /// Returns `None` when no job was ever started (or it was cleared).
    pub async fn wait(&self) -> Option<Job> {
        let mut updates = self.slot().as_ref()?.updates.clone();
        if let Ok(job) = updates.wait_for(|job| job.status.is_terminal()).await {
            return Some(job.clone());
        }
        // The job task ended; its last publish is what we have.
        let last = updates.borrow().clone();
        Some(last)
    }

    /// Row count, size and age of the snapshot
    pub fn snapshot_metadata(&self) -> Result<SnapshotMetadata, ServiceError> {
        Ok(self.orchestrator.store().metadata()?)
    }

    /// Underlying orchestrator
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}
