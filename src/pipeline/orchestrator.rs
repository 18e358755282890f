//! Job executor: fetch → parse → (details) → merge/persist → sync

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

use super::{Job, PageBudget, PipelineError, StopReason};
use crate::cancel::CancelSignal;
use crate::config::PipelineConfig;
use crate::fetcher::{PageFetcher, SiteFetcher};
use crate::identifier::DERIVED_PREFIX;
use crate::metrics::{self, JobMetrics, PageOutcome};
use crate::parser::{self, detail};
use crate::retry::Retryable;
use crate::store::{self, RecordStore};
use crate::sync::{RemoteHttpClient, SyncClient, SyncError, SyncState};
use crate::Listing;

/// Sync client plus where its state lives
#[derive(Clone)]
pub struct SyncStage {
    client: SyncClient,
    state_path: PathBuf,
}

impl SyncStage {
    /// Stage pushing through `client`, keeping state at `state_path`
    pub fn new(client: SyncClient, state_path: impl Into<PathBuf>) -> Self {
        Self {
            client,
            state_path: state_path.into(),
        }
    }
}

/// Runs one job at a time through every stage.
pub struct Orchestrator {
    fetcher: Arc<dyn PageFetcher>,
    store: RecordStore,
    sync: Option<SyncStage>,
    max_pages_cap: u32,
    detail_limit: Option<usize>,
}

impl Orchestrator {
    /// Orchestrator without a sync stage
    pub fn new(fetcher: Arc<dyn PageFetcher>, store: RecordStore) -> Self {
        Self {
            fetcher,
            store,
            sync: None,
            max_pages_cap: crate::fetcher::site_config::DEFAULT_MAX_PAGES_CAP,
            detail_limit: None,
        }
    }

    /// Build the HTTP fetcher, the store and (when a remote is configured)
    /// the sync stage from `config`
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let retry = config.retry.policy();
        let fetcher = SiteFetcher::new(config.site.clone(), retry)?;
        let mut orchestrator = Self::new(
            Arc::new(fetcher),
            RecordStore::new(config.snapshot_path.clone()),
        )
        .with_max_pages_cap(config.site.max_pages_cap);
        if config.site.fetch_details {
            orchestrator = orchestrator.with_details(config.site.max_details_per_job);
        }

        if config.remote.is_configured() {
            let remote = RemoteHttpClient::new(config.remote.clone())?;
            let client = SyncClient::new(Arc::new(remote))
                .with_batch_size(config.remote.batch_size)
                .with_retry(retry);
            orchestrator = orchestrator.with_sync(SyncStage::new(client, config.sync_state_path()));
        } else {
            debug!("No remote configured, sync stage disabled");
        }

        Ok(orchestrator)
    }

    /// Attach a sync stage
    pub fn with_sync(mut self, stage: SyncStage) -> Self {
        self.sync = Some(stage);
        self
    }

    /// Cap on pages per job, whatever the filter asks for
    pub fn with_max_pages_cap(mut self, cap: u32) -> Self {
        self.max_pages_cap = cap.max(1);
        self
    }

    /// Visit up to `limit` detail pages per job after pagination
    pub fn with_details(mut self, limit: usize) -> Self {
        self.detail_limit = Some(limit);
        self
    }

    /// Snapshot store
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Drive `job` to a terminal state.
    ///
    /// Every change is published on `updates`. Cancellation is checked before
    /// each page request; a page already in flight completes. The returned job
    /// is always terminal unless it was not pending on entry.
    pub async fn run(&self, job: Job, cancel: &CancelSignal, updates: &watch::Sender<Job>) -> Job {
        let span = info_span!("job", job_id = job.id, filter = %job.filter.summary());
        self.run_inner(job, cancel, updates).instrument(span).await
    }

    async fn run_inner(
        &self,
        mut job: Job,
        cancel: &CancelSignal,
        updates: &watch::Sender<Job>,
    ) -> Job {
        if let Err(err) = job.start() {
            warn!(error = %err, "Job not started");
            return job;
        }
        let job_metrics = JobMetrics::start(job.id, &job.filter.summary());
        publish(updates, &job);

        let mut collected = self.paginate(&mut job, cancel, updates).await;
        let mut cancelled = cancel.is_cancelled();

        let attempted = job.progress.pages_attempted();
        if !cancelled && collected.is_empty() && attempted > 0 && job.progress.pages_failed == attempted {
            let reason = format!("all {attempted} attempted pages failed");
            finish(&mut job, |j| j.fail(reason));
            return self.conclude(job, &job_metrics, updates);
        }

        if let Some(limit) = self.detail_limit {
            if !cancelled {
                self.fetch_details(&mut job, &mut collected, limit, cancel, updates)
                    .await;
                cancelled = cancel.is_cancelled();
            }
        }

        let collected = collected.into_iter().map(|(_, listing)| listing).collect();
        let merged = match self.merge_and_persist(collected) {
            Ok(merged) => merged,
            Err(err) => {
                finish(&mut job, |j| j.fail(format!("snapshot not persisted: {err}")));
                return self.conclude(job, &job_metrics, updates);
            }
        };
        job.progress.records_written = merged.len();
        publish(updates, &job);

        if cancelled {
            info!(rows = merged.len(), "Cancelled, partial snapshot kept and sync skipped");
            finish(&mut job, Job::cancel);
            return self.conclude(job, &job_metrics, updates);
        }

        if let Some(stage) = &self.sync {
            self.sync_snapshot(stage, &merged, &mut job).await;
        }

        finish(&mut job, Job::succeed);
        self.conclude(job, &job_metrics, updates)
    }

    /// Walk the page budget, returning every listing parsed with the page
    /// it was found on
    async fn paginate(
        &self,
        job: &mut Job,
        cancel: &CancelSignal,
        updates: &watch::Sender<Job>,
    ) -> Vec<(u32, Listing)> {
        let mut collected = Vec::new();
        let mut stop = StopReason::PageLimit;

        for page in PageBudget::new(&job.filter, self.max_pages_cap) {
            if cancel.is_cancelled() {
                info!(page, "Cancellation observed before page request");
                stop = StopReason::Cancelled;
                break;
            }

            let raw = match self.fetcher.fetch(&job.filter, page).await {
                Ok(raw) => raw,
                Err(err) => {
                    job.progress.pages_failed += 1;
                    metrics::record_page(PageOutcome::FetchFailed, 0, 0);
                    job.warn(format!("page {page}: {err}"));
                    publish(updates, job);

                    // the fetcher has already retried transient failures
                    if err.is_transient() {
                        warn!(page, error = %err, "Retries exhausted, stopping pagination");
                        stop = StopReason::FetchExhausted;
                        break;
                    }
                    warn!(page, error = %err, "Page skipped");
                    continue;
                }
            };
            job.progress.pages_fetched += 1;

            match parser::parse_page(&raw) {
                Ok(parsed) => {
                    let count = parsed.listings.len();
                    metrics::record_page(PageOutcome::Parsed, count, parsed.skipped);
                    job.progress.records_parsed += count;
                    job.progress.records_skipped += parsed.skipped;
                    debug!(page, listings = count, skipped = parsed.skipped, "Page parsed");

                    if count == 0 && parsed.skipped == 0 {
                        publish(updates, job);
                        info!(page, "Empty result page, stopping pagination");
                        stop = StopReason::EmptyPage;
                        break;
                    }
                    collected.extend(parsed.listings.into_iter().map(|l| (page, l)));
                }
                Err(err) => {
                    job.progress.pages_failed += 1;
                    metrics::record_page(PageOutcome::ParseFailed, 0, 0);
                    warn!(page, error = %err, "Page could not be parsed, skipping");
                    job.warn(format!("page {page}: {err}"));
                }
            }
            publish(updates, job);
        }

        info!(
            reason = %stop,
            pages_fetched = job.progress.pages_fetched,
            pages_failed = job.progress.pages_failed,
            records = collected.len(),
            "Pagination finished"
        );
        job.stop_reason = Some(stop);
        collected
    }

    /// Merge detail pages into the collected listings.
    ///
    /// Derived-id listings have no detail page and are passed over. A listing
    /// seen on several pages is visited once. Failures are warnings; a
    /// transient failure that outlived its retries ends the pass.
    async fn fetch_details(
        &self,
        job: &mut Job,
        collected: &mut [(u32, Listing)],
        limit: usize,
        cancel: &CancelSignal,
        updates: &watch::Sender<Job>,
    ) {
        let mut visited = HashSet::new();

        for (page, listing) in collected.iter_mut() {
            if listing.id.starts_with(DERIVED_PREFIX) || visited.contains(&listing.id) {
                continue;
            }
            if visited.len() >= limit {
                info!(limit, "Detail page limit reached");
                break;
            }
            if cancel.is_cancelled() {
                info!(id = %listing.id, "Cancellation observed before detail request");
                break;
            }
            visited.insert(listing.id.clone());

            match self.fetcher.fetch_detail(&listing.url, *page).await {
                Ok(raw) => match detail::parse_detail(&raw) {
                    Ok(detail_page) => {
                        detail::enrich(listing, detail_page);
                        job.progress.details_fetched += 1;
                    }
                    Err(err) => {
                        job.progress.details_failed += 1;
                        warn!(id = %listing.id, error = %err, "Detail page not parsed");
                        job.warn(format!("detail {}: {err}", listing.id));
                    }
                },
                Err(err) => {
                    job.progress.details_failed += 1;
                    job.warn(format!("detail {}: {err}", listing.id));
                    if err.is_transient() {
                        warn!(id = %listing.id, error = %err, "Retries exhausted, stopping detail pass");
                        publish(updates, job);
                        break;
                    }
                    warn!(id = %listing.id, error = %err, "Detail page skipped");
                }
            }
            publish(updates, job);
        }

        info!(
            fetched = job.progress.details_fetched,
            failed = job.progress.details_failed,
            "Detail pass finished"
        );
    }

    fn merge_and_persist(&self, collected: Vec<Listing>) -> store::PersistResult<Vec<Listing>> {
        let existing = self.store.load()?;
        let previous = existing.len();
        let merged = store::merge(existing, collected);
        self.store.persist(&merged)?;
        info!(previous, rows = merged.len(), "Snapshot updated");
        Ok(merged)
    }

    /// Push the snapshot delta; every problem becomes a job warning
    async fn sync_snapshot(&self, stage: &SyncStage, records: &[Listing], job: &mut Job) {
        let mut state = match SyncState::load(&stage.state_path) {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "Sync skipped");
                job.warn(format!("sync skipped: {err}"));
                return;
            }
        };

        match stage.client.sync(records, &mut state).await {
            Ok(report) => {
                job.progress.records_synced = report.accepted.len();
            }
            Err(SyncError::Partial { failed_ids, report }) => {
                job.progress.records_synced = report.accepted.len();
                job.progress.records_sync_failed = failed_ids.len();
                for failed in &report.failed {
                    job.warn(format!("sync {}: {}", failed.id, failed.reason));
                }
            }
            Err(err) => {
                warn!(error = %err, "Sync failed");
                job.warn(format!("sync failed: {err}"));
            }
        }

        if let Err(err) = state.save(&stage.state_path) {
            warn!(error = %err, "Sync state not saved");
            job.warn(format!("sync state not saved: {err}"));
        }
    }

    fn conclude(&self, job: Job, job_metrics: &JobMetrics, updates: &watch::Sender<Job>) -> Job {
        job_metrics.record_terminal(job.status.as_str(), job.progress.records_written);
        publish(updates, &job);
        job
    }
}

fn publish(updates: &watch::Sender<Job>, job: &Job) {
    updates.send_replace(job.clone());
}

fn finish<F>(job: &mut Job, transition: F)
where
    F: FnOnce(&mut Job) -> Result<(), PipelineError>,
{
    if let Err(err) = transition(job) {
        warn!(error = %err, "Ignoring invalid job transition");
    }
}
