//! Full pipeline runs against an in-memory site and remote

use std::path::Path;
use std::sync::Arc;

use listing_sync::fetcher::FetchError;
use listing_sync::filter::FilterCriteria;
use listing_sync::pipeline::{Job, JobStatus, Orchestrator, StopReason, SyncStage};
use listing_sync::retry::RetryPolicy;
use listing_sync::service::ScrapeService;
use listing_sync::store::RecordStore;
use listing_sync::sync::{SyncClient, SyncState};

use crate::support::{detail_page, listing_id, toyota_page, MemoryRemote, MockSite};

fn service(dir: &Path, site: Arc<MockSite>, remote: Arc<MemoryRemote>) -> ScrapeService {
    let client = SyncClient::new(remote).with_retry(RetryPolicy::none());
    let orchestrator = Orchestrator::new(site, RecordStore::new(dir.join("listings.csv")))
        .with_sync(SyncStage::new(client, dir.join("sync_state.json")));
    ScrapeService::new(orchestrator)
}

async fn run(service: &ScrapeService, filter: FilterCriteria) -> Job {
    service.start(filter).unwrap();
    service.wait().await.unwrap()
}

fn two_page_site() -> Arc<MockSite> {
    Arc::new(MockSite::new(vec![toyota_page(1, 15), toyota_page(2, 10)]))
}

#[tokio::test]
async fn test_two_page_toyota_scrape() {
    let dir = tempfile::tempdir().unwrap();
    let site = two_page_site();
    let remote = Arc::new(MemoryRemote::default());
    let service = service(dir.path(), site.clone(), remote.clone());

    let job = run(&service, FilterCriteria::for_make("Toyota").with_max_pages(2)).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(job.warnings.is_empty(), "unexpected warnings: {:?}", job.warnings);
    assert!(job.errors.is_empty());
    assert_eq!(job.stop_reason, Some(StopReason::PageLimit));
    assert_eq!(site.requested(), vec![1, 2]);

    assert_eq!(job.progress.pages_fetched, 2);
    assert_eq!(job.progress.records_parsed, 25);
    assert_eq!(job.progress.records_written, 25);
    assert_eq!(job.progress.records_synced, 25);

    let rows = RecordStore::new(dir.path().join("listings.csv")).load().unwrap();
    assert_eq!(rows.len(), 25);
    assert_eq!(rows[0].id, listing_id(1, 0));
    assert_eq!(rows[24].id, listing_id(2, 9));
    assert_eq!(rows[0].make.as_deref(), Some("Toyota"));

    let state = SyncState::load(&dir.path().join("sync_state.json")).unwrap();
    assert_eq!(state.len(), 25);
    assert_eq!(remote.stored(), 25);

    let metadata = service.snapshot_metadata().unwrap();
    assert!(metadata.exists);
    assert_eq!(metadata.rows, 25);
}

#[tokio::test]
async fn test_second_run_transmits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(MemoryRemote::default());
    let filter = FilterCriteria::for_make("Toyota").with_max_pages(2);

    let first = run(&service(dir.path(), two_page_site(), remote.clone()), filter.clone()).await;
    assert_eq!(first.progress.records_synced, 25);
    assert_eq!(remote.transmitted(), 25);

    // fresh service, same files on disk
    let second = run(&service(dir.path(), two_page_site(), remote.clone()), filter).await;
    assert_eq!(second.status, JobStatus::Succeeded);
    assert_eq!(second.progress.records_written, 25);
    assert_eq!(second.progress.records_synced, 0);
    assert_eq!(remote.transmitted(), 25);
    assert_eq!(remote.batches().len(), 1);
}

#[tokio::test]
async fn test_changed_listing_is_resent() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(MemoryRemote::default());
    let filter = FilterCriteria::for_make("Toyota");

    run(&service(dir.path(), Arc::new(MockSite::new(vec![toyota_page(1, 3)])), remote.clone()), filter.clone()).await;

    let repriced = toyota_page(1, 3).replace("$18250", "$17999");
    let job = run(&service(dir.path(), Arc::new(MockSite::new(vec![repriced])), remote.clone()), filter).await;

    assert_eq!(job.progress.records_synced, 1);
    assert_eq!(remote.batches().last().unwrap(), &vec![listing_id(1, 1)]);
}

#[tokio::test]
async fn test_snapshot_accumulates_across_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(MemoryRemote::default());

    let first_site = Arc::new(MockSite::new(vec![toyota_page(1, 4)]));
    run(&service(dir.path(), first_site, remote.clone()), FilterCriteria::for_make("Toyota")).await;

    let second_site = Arc::new(MockSite::new(vec![String::new(), toyota_page(2, 3)]));
    let job = run(
        &service(dir.path(), second_site, remote.clone()),
        FilterCriteria::for_make("Toyota").with_start_page(2),
    )
    .await;

    assert_eq!(job.progress.records_parsed, 3);
    assert_eq!(job.progress.records_written, 7);
    assert_eq!(remote.stored(), 7);
}

#[tokio::test]
async fn test_rejected_listings_are_warnings() {
    let dir = tempfile::tempdir().unwrap();
    let rejected = listing_id(1, 2);
    let remote = Arc::new(MemoryRemote::rejecting(&[rejected.as_str()]));
    let site = Arc::new(MockSite::new(vec![toyota_page(1, 5)]));

    let job = run(&service(dir.path(), site, remote), FilterCriteria::for_make("Toyota")).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.progress.records_synced, 4);
    assert_eq!(job.progress.records_sync_failed, 1);
    assert_eq!(job.warnings.len(), 1);
    assert!(job.warnings[0].contains(&rejected));

    let state = SyncState::load(&dir.path().join("sync_state.json")).unwrap();
    assert_eq!(state.len(), 4);
    assert!(state.get(&rejected).is_none());
}

#[tokio::test]
async fn test_client_error_page_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(
        MockSite::new(vec![toyota_page(1, 5), String::new(), toyota_page(3, 5)]).failing(
            2,
            FetchError::ClientError {
                page: 2,
                status: 404,
                message: "gone".to_string(),
            },
        ),
    );
    let remote = Arc::new(MemoryRemote::default());

    let job = run(
        &service(dir.path(), site.clone(), remote),
        FilterCriteria::for_make("Toyota").with_max_pages(3),
    )
    .await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(site.requested(), vec![1, 2, 3]);
    assert_eq!(job.progress.pages_failed, 1);
    assert_eq!(job.progress.records_written, 10);
    assert_eq!(job.warnings.len(), 1);
    assert!(job.warnings[0].starts_with("page 2:"));
}

#[tokio::test]
async fn test_detail_pass_reaches_the_remote() {
    let dir = tempfile::tempdir().unwrap();
    let vin = "4T1B11HK5JU000001";
    let site = Arc::new(MockSite::new(vec![toyota_page(1, 2)]).with_detail(&detail_page(vin)));
    let remote = Arc::new(MemoryRemote::default());
    let client = SyncClient::new(remote.clone()).with_retry(RetryPolicy::none());
    let orchestrator = Orchestrator::new(site.clone(), RecordStore::new(dir.path().join("listings.csv")))
        .with_sync(SyncStage::new(client, dir.path().join("sync_state.json")))
        .with_details(10);
    let service = ScrapeService::new(orchestrator);

    let job = run(&service, FilterCriteria::for_make("Toyota")).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.progress.details_fetched, 2);
    assert_eq!(
        site.detail_requested(),
        vec![
            format!("https://www.cars.com/vehicledetail/{}/", listing_id(1, 0)),
            format!("https://www.cars.com/vehicledetail/{}/", listing_id(1, 1)),
        ]
    );

    let sent = remote.get(&listing_id(1, 0)).unwrap();
    let details = sent.details.unwrap();
    assert_eq!(details.vin.as_deref(), Some(vin));
    assert_eq!(details.exterior_color.as_deref(), Some("Midnight Black"));
    assert_eq!(details.features["convenience"], vec!["Keyless Start".to_string()]);
    // card values win over the detail page
    assert_eq!(remote.get(&listing_id(1, 1)).unwrap().price, Some(18_250));

    // ids stay card-derived and the snapshot keeps its columns
    let rows = RecordStore::new(dir.path().join("listings.csv")).load().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, listing_id(1, 0));
    assert!(rows.iter().all(|row| row.details.is_none()));
}
