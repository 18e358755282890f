//! Remote CMS API
//!
//! The remote exposes three endpoints under a versioned namespace:
//! - `POST update-cars-data` upserts a batch keyed by listing id
//! - `GET get-cars-data?limit=N` reads records back
//! - `POST clear-cars-data` wipes the remote store
//!
//! [`RemoteHttpClient`] makes exactly one attempt per call; retrying is the
//! caller's job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

use super::FailedRecord;
use crate::config::RemoteConfig;
use crate::metrics::HttpRequestMetrics;
use crate::retry::{self, RetryErrorType, Retryable};
use crate::Listing;

/// Upsert endpoint name
pub const UPSERT_ENDPOINT: &str = "update-cars-data";
/// Read-back endpoint name
pub const READ_ENDPOINT: &str = "get-cars-data";
/// Reset endpoint name
pub const CLEAR_ENDPOINT: &str = "clear-cars-data";

/// Remote call errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Transport failure
    #[error("network error: {0}")]
    Network(String),

    /// Call exceeded its timeout
    #[error("request timed out")]
    Timeout,

    /// 5xx response
    #[error("remote server error {status}")]
    Server {
        /// HTTP status
        status: u16,
    },

    /// 429 response
    #[error("rate limited by remote")]
    RateLimited,

    /// 401/403 response
    #[error("remote authentication failed ({status})")]
    Auth {
        /// HTTP status
        status: u16,
    },

    /// Other 4xx response
    #[error("remote rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Response excerpt
        message: String,
    },

    /// Response body could not be decoded
    #[error("unexpected remote response: {0}")]
    Decode(String),

    /// Client could not be configured
    #[error("remote client configuration: {0}")]
    Config(String),
}

impl Retryable for RemoteError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Network(_)
                | RemoteError::Timeout
                | RemoteError::Server { .. }
                | RemoteError::RateLimited
        )
    }
}

/// Per-record result of one upsert batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Ids the remote stored
    pub accepted: Vec<String>,
    /// Ids the remote refused, with its reason
    pub rejected: Vec<FailedRecord>,
}

/// One record read back from the remote
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteRecord {
    /// Listing id
    pub id: String,
    /// Remaining fields as the remote returned them
    pub fields: Map<String, Value>,
}

/// Remote CMS operations
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Upsert `batch` keyed by listing id
    async fn upsert_batch(&self, batch: &[Listing]) -> Result<BatchOutcome, RemoteError>;

    /// Read up to `limit` records back
    async fn fetch_listings(&self, limit: usize) -> Result<Vec<RemoteRecord>, RemoteError>;

    /// Delete every record on the remote
    async fn clear(&self) -> Result<(), RemoteError>;
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    cars_data: &'a [Listing],
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
struct RejectedEntry {
    id: Value,
    #[serde(default, alias = "message", alias = "reason")]
    error: Option<String>,
}

/// Body of an upsert response. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct UpsertResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    accepted: Option<Vec<Value>>,
    #[serde(default)]
    rejected: Option<Vec<RejectedEntry>>,
}

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl UpsertResponse {
    /// Resolve per-record outcomes for the ids that were sent.
    ///
    /// No detail at all means the whole batch was accepted, unless the body
    /// says `success: false`. With an explicit `accepted` list, sent ids the
    /// remote did not mention count as failed.
    pub(crate) fn into_outcome(self, sent: &[String]) -> BatchOutcome {
        let sent_set: HashSet<&str> = sent.iter().map(String::as_str).collect();

        let mut rejected: Vec<FailedRecord> = self
            .rejected
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| {
                let id = value_to_id(&entry.id)?;
                sent_set.contains(id.as_str()).then(|| FailedRecord {
                    id,
                    reason: entry.error.unwrap_or_else(|| "rejected by remote".to_string()),
                })
            })
            .collect();
        let rejected_ids: HashSet<String> = rejected.iter().map(|r| r.id.clone()).collect();

        let accepted = match self.accepted {
            Some(list) => {
                let confirmed: HashSet<String> = list.iter().filter_map(value_to_id).collect();
                for id in sent {
                    if !confirmed.contains(id) && !rejected_ids.contains(id) {
                        rejected.push(FailedRecord {
                            id: id.clone(),
                            reason: "not confirmed by remote".to_string(),
                        });
                    }
                }
                sent.iter()
                    .filter(|id| confirmed.contains(*id) && !rejected_ids.contains(*id))
                    .cloned()
                    .collect()
            }
            None if self.success == Some(false) && rejected.is_empty() => {
                let reason = self
                    .message
                    .unwrap_or_else(|| "remote reported failure".to_string());
                rejected = sent
                    .iter()
                    .map(|id| FailedRecord {
                        id: id.clone(),
                        reason: reason.clone(),
                    })
                    .collect();
                Vec::new()
            }
            None => sent
                .iter()
                .filter(|id| !rejected_ids.contains(*id))
                .cloned()
                .collect(),
        };

        BatchOutcome { accepted, rejected }
    }
}

/// Every sent id fails when a 2xx body is neither empty nor a readable
/// response object (HTML error page, bare `false`, mistyped fields).
pub(crate) fn unreadable_outcome(sent: &[String], body: &str) -> BatchOutcome {
    let excerpt: String = body.split_whitespace().collect::<Vec<_>>().join(" ");
    let reason = format!(
        "unreadable response: {}",
        excerpt.chars().take(120).collect::<String>()
    );
    BatchOutcome {
        accepted: Vec::new(),
        rejected: sent
            .iter()
            .map(|id| FailedRecord {
                id: id.clone(),
                reason: reason.clone(),
            })
            .collect(),
    }
}

/// HTTP implementation of [`RemoteApi`]
pub struct RemoteHttpClient {
    client: Client,
    config: RemoteConfig,
}

impl RemoteHttpClient {
    /// Build a client for `config`
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        if !config.is_configured() {
            return Err(RemoteError::Config("remote base URL is not set".to_string()));
        }
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RemoteError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Configuration in use
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.username {
            Some(user) => request.basic_auth(user, self.config.password.as_deref()),
            None => request,
        }
    }

    async fn send(&self, label: &'static str, request: RequestBuilder) -> Result<Response, RemoteError> {
        let request_metrics = HttpRequestMetrics::start(label, 1);
        let response = match self.authorize(request).send().await {
            Ok(response) => response,
            Err(e) => {
                request_metrics.record_network_error(&e.to_string());
                return Err(match retry::classify(None, Some(&e)) {
                    RetryErrorType::NetworkTimeout => RemoteError::Timeout,
                    other => RemoteError::Network(format!("{}: {e}", other.description())),
                });
            }
        };

        let status = response.status();
        request_metrics.record_complete(status.as_u16());
        if status.is_success() {
            return Ok(response);
        }

        Err(match retry::classify(Some(status), None) {
            RetryErrorType::RateLimit => RemoteError::RateLimited,
            RetryErrorType::ServerError(code) => RemoteError::Server { status: code },
            RetryErrorType::AuthFailed(code) => RemoteError::Auth { status: code },
            _ => {
                let text = response.text().await.unwrap_or_default();
                RemoteError::Rejected {
                    status: status.as_u16(),
                    message: text.chars().take(200).collect(),
                }
            }
        })
    }
}

#[async_trait]
impl RemoteApi for RemoteHttpClient {
    async fn upsert_batch(&self, batch: &[Listing]) -> Result<BatchOutcome, RemoteError> {
        let sent: Vec<String> = batch.iter().map(|l| l.id.clone()).collect();
        let body = UpsertRequest {
            cars_data: batch,
            timestamp: Utc::now(),
        };

        let request = self
            .client
            .post(self.config.endpoint(UPSERT_ENDPOINT))
            .json(&body);
        let response = self.send("remote_upsert", request).await?;

        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(UpsertResponse::default().into_outcome(&sent));
        }

        match serde_json::from_str::<UpsertResponse>(&text) {
            Ok(parsed) => Ok(parsed.into_outcome(&sent)),
            Err(e) => {
                debug!(error = %e, "Upsert response could not be read, batch not confirmed");
                Ok(unreadable_outcome(&sent, &text))
            }
        }
    }

    async fn fetch_listings(&self, limit: usize) -> Result<Vec<RemoteRecord>, RemoteError> {
        let request = self
            .client
            .get(self.config.endpoint(READ_ENDPOINT))
            .query(&[("limit", limit.to_string())]);
        let response = self.send("remote_read", request).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        let items = match &body {
            Value::Array(items) => items,
            Value::Object(object) => object
                .get("cars_data")
                .and_then(Value::as_array)
                .ok_or_else(|| RemoteError::Decode("missing cars_data array".to_string()))?,
            _ => return Err(RemoteError::Decode("expected a JSON object".to_string())),
        };

        Ok(items
            .iter()
            .filter_map(|item| {
                let mut fields = item.as_object()?.clone();
                let id = fields.remove("id").as_ref().and_then(value_to_id)?;
                Some(RemoteRecord { id, fields })
            })
            .collect())
    }

    async fn clear(&self) -> Result<(), RemoteError> {
        let request = self.client.post(self.config.endpoint(CLEAR_ENDPOINT));
        self.send("remote_clear", request).await?;
        Ok(())
    }
}
