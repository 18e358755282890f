//! # Listing Sync
//!
//! Scrapes vehicle listings from an automotive marketplace, keeps them in a
//! durable CSV snapshot and pushes incremental upserts to a remote content
//! management system.
//!
//! ## Pipeline
//!
//! One job runs the stages below in order, inside a single task:
//!
//! 1. **Fetch** result pages for a [`filter::FilterCriteria`] ([`fetcher`])
//! 2. **Parse** every page into typed [`Listing`] records ([`parser`])
//! 3. **Merge and persist** the records into the snapshot ([`store`])
//! 4. **Sync** the changed records to the remote system ([`sync`])
//!
//! The [`pipeline`] module drives a single job; [`service::ScrapeService`]
//! owns the "current job" slot and enforces that only one job runs at a time.
//!
//! ## Quick Start
//!
//! ```no_run
//! use listing_sync::config::PipelineConfig;
//! use listing_sync::filter::FilterCriteria;
//! use listing_sync::service::ScrapeService;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default();
//! let service = ScrapeService::from_config(&config)?;
//!
//! let filter = FilterCriteria::for_make("Toyota").with_max_pages(2);
//! service.start(filter)?;
//!
//! let job = service.wait().await.expect("job was started");
//! println!("{} rows written", job.progress.records_written);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ops::RangeInclusive;

pub use parser::detail::VehicleDetails;

/// Cooperative cancellation shared between the service and a running job
pub mod cancel;

/// CLI command implementations
pub mod cli;

/// Pipeline configuration
pub mod config;

/// Listing page fetchers
pub mod fetcher;

/// Scrape filter criteria and query building
pub mod filter;

/// Listing identifier derivation
pub mod identifier;

/// Observability metrics
pub mod metrics;

/// Page parsers
pub mod parser;

/// Job orchestration
pub mod pipeline;

/// Bounded retry policy and error classification
pub mod retry;

/// Single-job service facade
pub mod service;

/// CSV snapshot store
pub mod store;

/// Remote synchronization
pub mod sync;

pub use filter::FilterCriteria;

/// Text written in place of a missing value in the CSV snapshot.
pub const UNKNOWN: &str = "unknown";

/// Model years accepted as real; anything else is treated as missing.
pub const MODEL_YEARS: RangeInclusive<u16> = 1886..=2100;

/// One normalized vehicle listing.
///
/// Optional attributes are `None` when the source page did not carry them.
/// The snapshot writes [`UNKNOWN`] for those and the remote payload sends
/// `null`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Listing {
    /// Stable listing identifier (site-assigned or derived, see [`identifier`])
    pub id: String,
    /// Manufacturer (e.g., "Toyota")
    pub make: Option<String>,
    /// Model and trim (e.g., "RAV4 XLE")
    pub model: Option<String>,
    /// Model year
    pub year: Option<u16>,
    /// Asking price in whole currency units
    pub price: Option<u64>,
    /// Odometer reading in miles
    pub mileage: Option<u64>,
    /// Dealer or seller location
    pub location: Option<String>,
    /// Absolute URL of the listing detail page
    pub url: String,
    /// Absolute URL of the primary photo
    pub image_url: Option<String>,
    /// When the page carrying this listing was fetched
    pub scraped_at: DateTime<Utc>,
    /// Detail page attributes, when the detail pass ran for this listing.
    ///
    /// Sent to the remote but not kept in the CSV snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<VehicleDetails>,
}

impl Listing {
    /// SHA-256 over every field except `scraped_at`, hex encoded.
    ///
    /// Two scrapes of an unchanged listing produce the same hash, which is
    /// what the sync delta relies on. Details only contribute when present,
    /// so listings without a detail pass hash as before.
    pub fn content_hash(&self) -> String {
        fn opt<T: ToString>(value: &Option<T>) -> String {
            value
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "\u{1e}".to_string())
        }

        let fields = [
            self.id.clone(),
            opt(&self.make),
            opt(&self.model),
            opt(&self.year),
            opt(&self.price),
            opt(&self.mileage),
            opt(&self.location),
            self.url.clone(),
            opt(&self.image_url),
        ];

        let mut hasher = Sha256::new();
        for field in &fields {
            hasher.update(field.as_bytes());
            hasher.update([0x1f]);
        }
        if let Some(details) = &self.details {
            hasher.update(details.canonical_text().as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Whether both listings carry the same field values, ignoring `scraped_at`.
    pub fn same_content(&self, other: &Listing) -> bool {
        self.content_hash() == other.content_hash()
    }

    /// Validate listing integrity
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Listing id cannot be empty".to_string());
        }

        if self.url.trim().is_empty() {
            return Err(format!("Listing {} has no URL", self.id));
        }

        if let Some(year) = self.year {
            if !MODEL_YEARS.contains(&year) {
                return Err(format!("Listing {} has implausible year {year}", self.id));
            }
        }

        Ok(())
    }
}
