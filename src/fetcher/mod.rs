//! Listing page fetchers

use crate::filter::FilterCriteria;
use crate::retry::Retryable;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod rate_limit;
pub mod site_config;
pub mod site_http;

pub use site_config::SiteConfig;
pub use site_http::SiteFetcher;

/// Fetch errors. Every variant that concerns a page carries its number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Connection refused, reset or other transport failure
    #[error("page {page}: network error: {message}")]
    TransientNetwork {
        /// Page number
        page: u32,
        /// Transport error text
        message: String,
    },

    /// Request exceeded the per-request timeout
    #[error("page {page}: request timed out after {timeout_secs}s")]
    Timeout {
        /// Page number
        page: u32,
        /// Configured timeout
        timeout_secs: u64,
    },

    /// 5xx response
    #[error("page {page}: server error {status}")]
    ServerError {
        /// Page number
        page: u32,
        /// HTTP status
        status: u16,
    },

    /// 429 response
    #[error("page {page}: rate limited by listing site")]
    RateLimited {
        /// Page number
        page: u32,
    },

    /// 4xx response other than 429; terminal for the page
    #[error("page {page}: client error {status}: {message}")]
    ClientError {
        /// Page number
        page: u32,
        /// HTTP status
        status: u16,
        /// Response excerpt
        message: String,
    },

    /// Request could not be built (bad base URL, bad header)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// Page the error belongs to, if any
    pub fn page(&self) -> Option<u32> {
        match self {
            FetchError::TransientNetwork { page, .. }
            | FetchError::Timeout { page, .. }
            | FetchError::ServerError { page, .. }
            | FetchError::RateLimited { page }
            | FetchError::ClientError { page, .. } => Some(*page),
            FetchError::InvalidRequest(_) => None,
        }
    }
}

impl Retryable for FetchError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::TransientNetwork { .. }
                | FetchError::Timeout { .. }
                | FetchError::ServerError { .. }
                | FetchError::RateLimited { .. }
        )
    }
}

/// Result type for fetcher operations
pub type FetchResult<T> = Result<T, FetchError>;

/// One fetched result page, unparsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    /// Page number that was requested
    pub page: u32,
    /// Final URL after redirects; base for resolving relative links
    pub url: String,
    /// Response body
    pub body: String,
    /// When the response arrived
    pub fetched_at: DateTime<Utc>,
}

/// Source of result pages.
///
/// [`SiteFetcher`] talks to the marketplace over HTTP; tests substitute
/// in-memory sites.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch result page `page` for `filter`.
    ///
    /// Implementations retry transient failures themselves; an `Err` is
    /// final for this page.
    async fn fetch(&self, filter: &FilterCriteria, page: u32) -> FetchResult<RawPage>;

    /// Fetch the detail page at `url` for a listing found on result page
    /// `page`. Errors carry that page number.
    ///
    /// Sources without detail pages keep the default, which refuses.
    async fn fetch_detail(&self, url: &str, _page: u32) -> FetchResult<RawPage> {
        Err(FetchError::InvalidRequest(format!(
            "detail pages not supported: {url}"
        )))
    }

    /// Site root used for logging
    fn base_url(&self) -> &str;
}
