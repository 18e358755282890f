//! Pipeline configuration
//!
//! Everything is defaulted. A JSON file can override any subset, the CLI
//! overrides the file, and the remote endpoint and credentials can also come
//! from the environment so secrets stay out of config files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetcher::SiteConfig;
use crate::retry::RetrySettings;

/// Environment variable for the remote base URL
pub const ENV_REMOTE_URL: &str = "LISTING_SYNC_REMOTE_URL";
/// Environment variable for the remote user
pub const ENV_REMOTE_USER: &str = "LISTING_SYNC_REMOTE_USER";
/// Environment variable for the remote application password
pub const ENV_REMOTE_PASSWORD: &str = "LISTING_SYNC_REMOTE_PASSWORD";

/// Default REST namespace of the remote plugin
pub const DEFAULT_REMOTE_NAMESPACE: &str = "/wp-json/cars-scraper/v1";
/// Default records per upsert batch
pub const DEFAULT_SYNC_BATCH_SIZE: usize = 50;
/// Default timeout for remote calls in seconds
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        /// Config file
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Config file is not valid JSON for [`PipelineConfig`]
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        /// Config file
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },

    /// A value is out of range
    #[error("invalid config value for {field}: {message}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong
        message: String,
    },
}

/// Remote CMS endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Site root of the remote system (e.g., `https://dealer.example.com`)
    pub base_url: String,
    /// Versioned REST namespace
    pub namespace: String,
    /// Basic auth user
    pub username: Option<String>,
    /// Basic auth application password
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Records per upsert batch
    pub batch_size: usize,
    /// Timeout per remote call in seconds
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            namespace: DEFAULT_REMOTE_NAMESPACE.to_string(),
            username: None,
            password: None,
            batch_size: DEFAULT_SYNC_BATCH_SIZE,
            request_timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
        }
    }
}

impl RemoteConfig {
    /// Remote at `base_url` with defaults for everything else
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Whether a remote is configured at all
    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty()
    }

    /// Full URL of endpoint `name` inside the namespace
    pub fn endpoint(&self, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.namespace.trim_matches('/'),
            name.trim_start_matches('/')
        )
    }

    /// Timeout per remote call
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Listing site
    pub site: SiteConfig,
    /// Remote CMS; sync is skipped when no base URL is set
    pub remote: RemoteConfig,
    /// Retry policy shared by both HTTP clients
    pub retry: RetrySettings,
    /// Primary CSV snapshot
    pub snapshot_path: PathBuf,
    /// Sync state document; defaults to `sync_state.json` next to the snapshot
    pub sync_state_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            remote: RemoteConfig::default(),
            retry: RetrySettings::default(),
            snapshot_path: PathBuf::from("data/listings.csv"),
            sync_state_path: None,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; fields not present keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` if given, else defaults; then apply the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply remote overrides from an environment lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_REMOTE_URL) {
            self.remote.base_url = url;
        }
        if let Some(user) = non_empty(ENV_REMOTE_USER) {
            self.remote.username = Some(user);
        }
        if let Some(password) = non_empty(ENV_REMOTE_PASSWORD) {
            self.remote.password = Some(password);
        }
    }

    /// Reject values that cannot work
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site.max_pages_cap == 0 {
            return Err(ConfigError::Invalid {
                field: "site.max_pages_cap",
                message: "must be at least 1".to_string(),
            });
        }
        if self.site.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "site.request_timeout_secs",
                message: "must be at least 1".to_string(),
            });
        }
        if self.site.fetch_details && self.site.max_details_per_job == 0 {
            return Err(ConfigError::Invalid {
                field: "site.max_details_per_job",
                message: "must be at least 1 when detail pages are fetched".to_string(),
            });
        }
        if url::Url::parse(&self.site.base_url).is_err() {
            return Err(ConfigError::Invalid {
                field: "site.base_url",
                message: format!("'{}' is not an absolute URL", self.site.base_url),
            });
        }
        if self.remote.is_configured() && url::Url::parse(&self.remote.base_url).is_err() {
            return Err(ConfigError::Invalid {
                field: "remote.base_url",
                message: format!("'{}' is not an absolute URL", self.remote.base_url),
            });
        }
        if self.remote.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "remote.batch_size",
                message: "must be at least 1".to_string(),
            });
        }
        if self.remote.password.is_some() && self.remote.username.is_none() {
            return Err(ConfigError::Invalid {
                field: "remote.username",
                message: "a password was given without a user".to_string(),
            });
        }
        Ok(())
    }

    /// Sync state document path
    pub fn sync_state_path(&self) -> PathBuf {
        self.sync_state_path.clone().unwrap_or_else(|| {
            self.snapshot_path
                .parent()
                .map(|dir| dir.join("sync_state.json"))
                .unwrap_or_else(|| PathBuf::from("sync_state.json"))
        })
    }
}
