//! Delta computation and batched upserts

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

use super::{FailedRecord, RemoteApi, RemoteRecord, SyncError, SyncReport, SyncResult, SyncState};
use crate::config::DEFAULT_SYNC_BATCH_SIZE;
use crate::metrics;
use crate::retry::RetryPolicy;
use crate::Listing;

/// Records that are new or changed relative to `state`, in input order
pub fn delta<'a>(records: &'a [Listing], state: &SyncState) -> Vec<&'a Listing> {
    records.iter().filter(|r| state.needs_sync(r)).collect()
}

/// Sends snapshot deltas to a [`RemoteApi`]
#[derive(Clone)]
pub struct SyncClient {
    api: Arc<dyn RemoteApi>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl SyncClient {
    /// Client with the default batch size and retry policy
    pub fn new(api: Arc<dyn RemoteApi>) -> Self {
        Self {
            api,
            batch_size: DEFAULT_SYNC_BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    /// Set records per batch (at least 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the per-batch retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Records per batch
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Push the delta of `records` and advance `state` for confirmed ids.
    ///
    /// Every batch is attempted even when an earlier one failed. `state` is
    /// updated in place; the caller persists it whether or not the run was
    /// partial.
    ///
    /// # Errors
    /// [`SyncError::Partial`] when any record was rejected or its batch
    /// exhausted its retries.
    pub async fn sync(&self, records: &[Listing], state: &mut SyncState) -> SyncResult<SyncReport> {
        let pending = delta(records, state);
        let mut report = SyncReport {
            attempted: pending.len(),
            unchanged: records.len() - pending.len(),
            ..SyncReport::default()
        };

        if pending.is_empty() {
            info!(unchanged = report.unchanged, "Remote already up to date");
            return Ok(report);
        }

        info!(
            pending = pending.len(),
            unchanged = report.unchanged,
            batch_size = self.batch_size,
            "Syncing changed listings"
        );

        for (index, chunk) in pending.chunks(self.batch_size).enumerate() {
            let batch: Vec<Listing> = chunk.iter().map(|l| (*l).clone()).collect();
            let by_id: HashMap<&str, &Listing> = chunk.iter().map(|l| (l.id.as_str(), *l)).collect();
            report.batches += 1;

            let span = info_span!("sync_batch", batch = index + 1, size = batch.len());
            let result = self
                .retry
                .execute("remote_upsert", |_| self.api.upsert_batch(&batch))
                .instrument(span)
                .await;

            match result {
                Ok(outcome) => {
                    let confirmed_at = Utc::now();
                    for id in &outcome.accepted {
                        if let Some(listing) = by_id.get(id.as_str()) {
                            state.mark_synced(listing, confirmed_at);
                        }
                    }
                    for failed in &outcome.rejected {
                        warn!(id = %failed.id, reason = %failed.reason, "Remote rejected listing");
                    }
                    metrics::record_sync_batch(outcome.accepted.len(), outcome.rejected.len(), false);
                    report.accepted.extend(outcome.accepted);
                    report.failed.extend(outcome.rejected);
                }
                Err(err) => {
                    warn!(
                        batch = index + 1,
                        size = batch.len(),
                        error = %err,
                        "Upsert batch failed, continuing with remaining batches"
                    );
                    metrics::record_sync_batch(0, batch.len(), true);
                    report.failed_batches += 1;
                    report.failed.extend(batch.iter().map(|l| FailedRecord {
                        id: l.id.clone(),
                        reason: err.to_string(),
                    }));
                }
            }
        }

        info!(
            accepted = report.accepted.len(),
            failed = report.failed.len(),
            batches = report.batches,
            failed_batches = report.failed_batches,
            "Sync finished"
        );

        if report.failed.is_empty() {
            Ok(report)
        } else {
            Err(SyncError::Partial {
                failed_ids: report.failed_ids(),
                report,
            })
        }
    }

    /// Read records back from the remote
    pub async fn read_back(&self, limit: usize) -> SyncResult<Vec<RemoteRecord>> {
        Ok(self
            .retry
            .execute("remote_read", |_| self.api.fetch_listings(limit))
            .await?)
    }

    /// Wipe the remote store and forget `state`
    pub async fn clear_remote(&self, state: &mut SyncState) -> SyncResult<()> {
        self.retry
            .execute("remote_clear", |_| self.api.clear())
            .await?;
        state.clear();
        warn!("Remote store cleared");
        Ok(())
    }
}
