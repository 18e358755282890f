//! Listing site configuration
//!
//! Everything that ties the fetcher to one marketplace lives here, so
//! pointing it at a mirror or a local test server is configuration only.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default marketplace root
pub const DEFAULT_BASE_URL: &str = "https://www.cars.com";

/// Search results path
pub const DEFAULT_SEARCH_PATH: &str = "/shopping/results/";

/// Browser-like user agent; the site serves a bot wall to unknown agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Default `Accept-Language` header
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Default per-request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default minimum delay between consecutive requests in milliseconds
pub const DEFAULT_MIN_REQUEST_INTERVAL_MS: u64 = 1500;

/// Hard ceiling on pages per job, whatever the filter asks for
pub const DEFAULT_MAX_PAGES_CAP: u32 = 50;

/// Default ceiling on detail pages fetched per job
pub const DEFAULT_MAX_DETAILS_PER_JOB: usize = 100;

/// Connection settings for the listing site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Site root (scheme and host)
    pub base_url: String,
    /// Path of the search results page
    pub search_path: String,
    /// `User-Agent` header
    pub user_agent: String,
    /// `Accept-Language` header
    pub accept_language: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Minimum delay between consecutive requests in milliseconds
    pub min_request_interval_ms: u64,
    /// Ceiling on pages per job
    pub max_pages_cap: u32,
    /// Visit each listing's detail page after pagination
    pub fetch_details: bool,
    /// Ceiling on detail pages per job
    pub max_details_per_job: usize,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            search_path: DEFAULT_SEARCH_PATH.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            min_request_interval_ms: DEFAULT_MIN_REQUEST_INTERVAL_MS,
            max_pages_cap: DEFAULT_MAX_PAGES_CAP,
            fetch_details: false,
            max_details_per_job: DEFAULT_MAX_DETAILS_PER_JOB,
        }
    }
}

impl SiteConfig {
    /// Config for a site served at `base_url` with no politeness delay
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            min_request_interval_ms: 0,
            ..Self::default()
        }
    }

    /// Full search URL without query
    pub fn search_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.search_path.trim_start_matches('/')
        )
    }

    /// Per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Minimum interval between requests
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }
}
