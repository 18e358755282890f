//! Cooperative cancellation at page boundaries

use std::sync::Arc;
use tokio::sync::watch;

use listing_sync::cancel::CancelSignal;
use listing_sync::filter::FilterCriteria;
use listing_sync::pipeline::{Job, JobStatus, Orchestrator, StopReason, SyncStage};
use listing_sync::retry::RetryPolicy;
use listing_sync::store::RecordStore;
use listing_sync::sync::SyncClient;

use crate::support::{listing_id, toyota_page, MemoryRemote, MockSite};

#[tokio::test]
async fn test_cancel_after_first_of_five_pages() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("listings.csv");
    let cancel = CancelSignal::shared();

    let site = Arc::new(
        MockSite::new((1..=5).map(|page| toyota_page(page, 12)).collect())
            .cancel_after(1, cancel.clone()),
    );
    let remote = Arc::new(MemoryRemote::default());
    let orchestrator = Orchestrator::new(site.clone(), RecordStore::new(&snapshot)).with_sync(
        SyncStage::new(
            SyncClient::new(remote.clone()).with_retry(RetryPolicy::none()),
            dir.path().join("sync_state.json"),
        ),
    );

    let job = Job::new(1, FilterCriteria::for_make("Toyota").with_max_pages(5));
    let (tx, rx) = watch::channel(job.clone());
    let job = orchestrator.run(job, &cancel, &tx).await;

    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.stop_reason, Some(StopReason::Cancelled));
    assert_eq!(site.requested(), vec![1]);

    let rows = RecordStore::new(&snapshot).load().unwrap();
    let ids: Vec<String> = rows.iter().map(|l| l.id.clone()).collect();
    let expected: Vec<String> = (0..12).map(|i| listing_id(1, i)).collect();
    assert_eq!(ids, expected);
    assert_eq!(job.progress.records_written, 12);

    // sync is skipped for cancelled jobs
    assert_eq!(remote.transmitted(), 0);
    assert!(!dir.path().join("sync_state.json").exists());

    assert_eq!(rx.borrow().status, JobStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_before_start_fetches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(MockSite::new(vec![toyota_page(1, 3)]));
    let orchestrator = Orchestrator::new(site.clone(), RecordStore::new(dir.path().join("l.csv")));

    let cancel = CancelSignal::new();
    cancel.cancel();

    let job = Job::new(7, FilterCriteria::for_make("Toyota").with_max_pages(3));
    let (tx, _rx) = watch::channel(job.clone());
    let job = orchestrator.run(job, &cancel, &tx).await;

    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(site.requested().is_empty());
    assert_eq!(job.progress.records_written, 0);
}
