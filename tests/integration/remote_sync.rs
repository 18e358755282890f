//! Sync client against a mock CMS endpoint

use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{basic_auth, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use listing_sync::config::RemoteConfig;
use listing_sync::retry::RetryPolicy;
use listing_sync::sync::{RemoteHttpClient, SyncClient, SyncError, SyncState};

use crate::support::listing;

const UPSERT: &str = "/wp-json/cars-scraper/v1/update-cars-data";

fn client(server: &MockServer, retry: RetryPolicy) -> SyncClient {
    let remote = RemoteHttpClient::new(RemoteConfig::new(server.uri())).unwrap();
    SyncClient::new(Arc::new(remote)).with_retry(retry)
}

async fn sent_ids(server: &MockServer) -> Vec<Vec<String>> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == UPSERT)
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).unwrap();
            body["cars_data"]
                .as_array()
                .unwrap()
                .iter()
                .map(|l| l["id"].as_str().unwrap().to_string())
                .collect()
        })
        .collect()
}

#[tokio::test]
async fn test_partial_rejection_then_retry_of_rejected_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPSERT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accepted": ["A", "C"],
            "rejected": [{"id": "B", "error": "price missing"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("sync_state.json");
    let records = vec![listing("A"), listing("B"), listing("C")];
    let sync = client(&server, RetryPolicy::none());

    let mut state = SyncState::new();
    let err = sync.sync(&records, &mut state).await.unwrap_err();
    let SyncError::Partial { failed_ids, report } = err else {
        panic!("expected a partial failure");
    };
    assert_eq!(failed_ids, vec!["B".to_string()]);
    assert_eq!(report.accepted, vec!["A".to_string(), "C".to_string()]);
    assert_eq!(report.failed[0].reason, "price missing");

    state.save(&state_path).unwrap();
    let mut state = SyncState::load(&state_path).unwrap();
    assert!(state.get("A").is_some());
    assert!(state.get("B").is_none());
    assert!(state.get("C").is_some());

    server.verify().await;
    server.reset().await;
    Mock::given(method("POST"))
        .and(path(UPSERT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&server)
        .await;

    let report = sync.sync(&records, &mut state).await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.unchanged, 2);
    assert_eq!(sent_ids(&server).await, vec![vec!["B".to_string()]]);
    assert_eq!(state.len(), 3);
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPSERT))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(UPSERT))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut state = SyncState::new();
    let report = client(&server, RetryPolicy::fast(3))
        .sync(&[listing("A"), listing("B")], &mut state)
        .await
        .unwrap();

    assert_eq!(report.accepted.len(), 2);
    assert_eq!(sent_ids(&server).await.len(), 2);
}

#[tokio::test]
async fn test_failed_batch_does_not_stop_later_batches() {
    let server = MockServer::start().await;
    // the first batch keeps failing, the second succeeds
    Mock::given(method("POST"))
        .and(path(UPSERT))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(UPSERT))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut state = SyncState::new();
    let err = client(&server, RetryPolicy::fast(2))
        .with_batch_size(2)
        .sync(&[listing("A"), listing("B"), listing("C")], &mut state)
        .await
        .unwrap_err();

    let SyncError::Partial { failed_ids, report } = err else {
        panic!("expected a partial failure");
    };
    assert_eq!(failed_ids, vec!["A".to_string(), "B".to_string()]);
    assert_eq!(report.accepted, vec!["C".to_string()]);
    assert_eq!(report.failed_batches, 1);
    assert_eq!(state.len(), 1);
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPSERT))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let mut state = SyncState::new();
    let err = client(&server, RetryPolicy::fast(3))
        .sync(&[listing("A")], &mut state)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Partial { .. }));
    assert!(state.is_empty());
}

#[tokio::test]
async fn test_basic_auth_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPSERT))
        .and(basic_auth("scraper", "abcd efgh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = RemoteConfig::new(server.uri());
    config.username = Some("scraper".to_string());
    config.password = Some("abcd efgh".to_string());
    let sync = SyncClient::new(Arc::new(RemoteHttpClient::new(config).unwrap()))
        .with_retry(RetryPolicy::none());

    let mut state = SyncState::new();
    sync.sync(&[listing("A")], &mut state).await.unwrap();
    assert_eq!(state.len(), 1);
}

#[tokio::test]
async fn test_read_back_and_clear() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/cars-scraper/v1/get-cars-data"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cars_data": [
                {"id": 101, "make": "Toyota", "price": 23995},
                {"id": "abc-2", "make": "Honda"},
                {"make": "no id"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/cars-scraper/v1/clear-cars-data"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let sync = client(&server, RetryPolicy::none());
    let records = sync.read_back(5).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, "101");
    assert_eq!(records[0].fields["make"], "Toyota");
    assert!(!records[0].fields.contains_key("id"));

    let mut state = SyncState::new();
    state.mark_synced(&listing("A"), chrono::Utc::now());
    sync.clear_remote(&mut state).await.unwrap();
    assert!(state.is_empty());
}

#[tokio::test]
async fn test_unreadable_success_body_confirms_nothing() {
    let bodies = [
        "false",
        r#"{"success": "false"}"#,
        "<html>Fatal error: database down</html>",
    ];

    for body in bodies {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(UPSERT))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;

        let mut state = SyncState::new();
        let err = client(&server, RetryPolicy::none())
            .sync(&[listing("A"), listing("B")], &mut state)
            .await
            .unwrap_err();

        let SyncError::Partial { failed_ids, report } = err else {
            panic!("expected a partial failure for {body}");
        };
        assert_eq!(failed_ids, vec!["A".to_string(), "B".to_string()]);
        assert!(report.accepted.is_empty());
        assert!(report.failed[0].reason.starts_with("unreadable response"));
        assert!(state.is_empty(), "state advanced for {body}");
    }
}
