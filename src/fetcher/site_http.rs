//! HTTP fetcher for the listing site
//!
//! Wraps a shared `reqwest` client with:
//! - filter-to-query translation
//! - a minimum interval between requests
//! - bounded retry of timeouts, connection errors, 5xx and 429

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::fetcher::rate_limit::RateLimiter;
use crate::fetcher::{FetchError, FetchResult, PageFetcher, RawPage, SiteConfig};
use crate::filter::FilterCriteria;
use crate::metrics::{self, HttpRequestMetrics};
use crate::retry::{self, RetryErrorType, RetryPolicy};

const ERROR_EXCERPT_LEN: usize = 200;

/// Fetches result pages from the listing site over HTTP
pub struct SiteFetcher {
    client: Client,
    config: SiteConfig,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl SiteFetcher {
    /// Build a fetcher with its own HTTP client
    ///
    /// # Errors
    /// Returns [`FetchError::InvalidRequest`] when the configured headers are
    /// not valid header values or the client cannot be built.
    pub fn new(config: SiteConfig, retry: RetryPolicy) -> FetchResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/json;q=0.9"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .map_err(|e| FetchError::InvalidRequest(format!("accept_language: {e}")))?,
        );

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| FetchError::InvalidRequest(format!("http client: {e}")))?;

        let rate_limiter = Arc::new(RateLimiter::min_interval(config.min_request_interval()));
        Ok(Self::with_client(client, config, rate_limiter, retry))
    }

    /// Build a fetcher around an existing client and limiter
    pub fn with_client(
        client: Client,
        config: SiteConfig,
        rate_limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            config,
            rate_limiter,
            retry,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    async fn request_once(
        &self,
        url: &str,
        params: &[(String, String)],
        kind: &'static str,
        page: u32,
        attempt: u32,
    ) -> FetchResult<RawPage> {
        let waited = self.rate_limiter.acquire().await;
        if !waited.is_zero() {
            metrics::record_politeness_wait(waited);
        }

        let request_metrics = HttpRequestMetrics::start(kind, attempt + 1);
        let response = match self.client.get(url).query(params).send().await {
            Ok(response) => response,
            Err(e) => {
                request_metrics.record_network_error(&e.to_string());
                return Err(self.transport_error(page, &e));
            }
        };

        let status = response.status();
        request_metrics.record_complete(status.as_u16());

        if !status.is_success() {
            let error_type = retry::classify(Some(status), None);
            return Err(match error_type {
                RetryErrorType::RateLimit => FetchError::RateLimited { page },
                RetryErrorType::ServerError(code) => FetchError::ServerError { page, status: code },
                _ => {
                    let text = response.text().await.unwrap_or_default();
                    warn!(
                        page,
                        status = status.as_u16(),
                        reason = error_type.description(),
                        "Listing site rejected request"
                    );
                    FetchError::ClientError {
                        page,
                        status: status.as_u16(),
                        message: excerpt(&text),
                    }
                }
            });
        }

        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(page, &e))?;

        debug!(
            page,
            kind,
            url = %final_url,
            bytes = body.len(),
            correlation_id = request_metrics.correlation_id(),
            "Fetched page"
        );

        Ok(RawPage {
            page,
            url: final_url,
            body,
            fetched_at: Utc::now(),
        })
    }

    fn transport_error(&self, page: u32, err: &reqwest::Error) -> FetchError {
        match retry::classify(None, Some(err)) {
            RetryErrorType::NetworkTimeout => FetchError::Timeout {
                page,
                timeout_secs: self.config.request_timeout_secs,
            },
            other => FetchError::TransientNetwork {
                page,
                message: format!("{}: {err}", other.description()),
            },
        }
    }
}

#[async_trait]
impl PageFetcher for SiteFetcher {
    async fn fetch(&self, filter: &FilterCriteria, page: u32) -> FetchResult<RawPage> {
        let url = self.config.search_url();
        let params = filter.query_params(page);

        self.retry
            .execute("listing_site", |attempt| {
                let url = url.as_str();
                let params = params.as_slice();
                async move { self.request_once(url, params, "search", page, attempt).await }
            })
            .await
    }

    async fn fetch_detail(&self, url: &str, page: u32) -> FetchResult<RawPage> {
        let url = url::Url::parse(url)
            .map_err(|e| FetchError::InvalidRequest(format!("detail url {url}: {e}")))?;

        self.retry
            .execute("listing_detail", |attempt| {
                let url = url.as_str();
                async move { self.request_once(url, &[], "detail", page, attempt).await }
            })
            .await
    }

    fn base_url(&self) -> &str {
        &self.config.base_url
    }
}

fn excerpt(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(ERROR_EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &collapsed[..idx]),
        None => collapsed,
    }
}
