//! Scrape filter criteria
//!
//! A [`FilterCriteria`] is the immutable scope of one job. It is validated
//! once when the job is accepted and then turned into query parameters for
//! every page request.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inventory class to search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockType {
    /// New and used
    #[default]
    All,
    /// New vehicles only
    New,
    /// Used vehicles only
    Used,
    /// Certified pre-owned only
    Cpo,
}

impl StockType {
    /// Value sent in the `stock_type` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            StockType::All => "all",
            StockType::New => "new",
            StockType::Used => "used",
            StockType::Cpo => "cpo",
        }
    }
}

impl fmt::Display for StockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockType {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(StockType::All),
            "new" => Ok(StockType::New),
            "used" => Ok(StockType::Used),
            "cpo" | "certified" => Ok(StockType::Cpo),
            other => Err(FilterError::InvalidStockType(other.to_string())),
        }
    }
}

/// Filter validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// Range with min above max
    #[error("{field}: minimum {min} is greater than maximum {max}")]
    InvertedRange {
        /// Field name
        field: &'static str,
        /// Lower bound
        min: u64,
        /// Upper bound
        max: u64,
    },

    /// Page numbering starts at 1
    #[error("start_page must be at least 1")]
    InvalidStartPage,

    /// At least one page must be requested
    #[error("max_pages must be at least 1")]
    InvalidMaxPages,

    /// Unknown stock type
    #[error("invalid stock type '{0}' (expected all, new, used or cpo)")]
    InvalidStockType(String),

    /// Search radius given without a zip code
    #[error("max_distance requires zip_code")]
    DistanceWithoutZip,
}

/// Immutable scrape scope for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    /// Inventory class
    pub stock_type: Option<StockType>,
    /// Makes to include (e.g., "toyota")
    pub makes: Vec<String>,
    /// Models to include, as the site's make-model slug (e.g., "toyota-camry")
    pub models: Vec<String>,
    /// Earliest model year
    pub year_min: Option<u16>,
    /// Latest model year
    pub year_max: Option<u16>,
    /// Lowest list price
    pub price_min: Option<u64>,
    /// Highest list price
    pub price_max: Option<u64>,
    /// Highest odometer reading
    pub mileage_max: Option<u64>,
    /// Search centre
    pub zip_code: Option<String>,
    /// Search radius around `zip_code`, in miles
    pub max_distance: Option<u32>,
    /// Body style slugs (e.g., "suv")
    pub body_styles: Vec<String>,
    /// Fuel type slugs (e.g., "hybrid")
    pub fuel_types: Vec<String>,
    /// First result page to request (1-based)
    pub start_page: u32,
    /// Number of pages to request at most
    pub max_pages: u32,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            stock_type: None,
            makes: Vec::new(),
            models: Vec::new(),
            year_min: None,
            year_max: None,
            price_min: None,
            price_max: None,
            mileage_max: None,
            zip_code: None,
            max_distance: None,
            body_styles: Vec::new(),
            fuel_types: Vec::new(),
            start_page: 1,
            max_pages: 1,
        }
    }
}

impl FilterCriteria {
    /// Filter on a single make
    pub fn for_make(make: impl Into<String>) -> Self {
        Self {
            makes: vec![make.into()],
            ..Self::default()
        }
    }

    /// Set the page limit
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Set the first page
    pub fn with_start_page(mut self, start_page: u32) -> Self {
        self.start_page = start_page;
        self
    }

    /// Check ranges and page bounds
    pub fn validate(&self) -> Result<(), FilterError> {
        if let (Some(min), Some(max)) = (self.year_min, self.year_max) {
            if min > max {
                return Err(FilterError::InvertedRange {
                    field: "year",
                    min: min.into(),
                    max: max.into(),
                });
            }
        }

        if let (Some(min), Some(max)) = (self.price_min, self.price_max) {
            if min > max {
                return Err(FilterError::InvertedRange {
                    field: "price",
                    min,
                    max,
                });
            }
        }

        if self.start_page == 0 {
            return Err(FilterError::InvalidStartPage);
        }

        if self.max_pages == 0 {
            return Err(FilterError::InvalidMaxPages);
        }

        if self.max_distance.is_some()
            && self.zip_code.as_deref().map_or(true, |z| z.trim().is_empty())
        {
            return Err(FilterError::DistanceWithoutZip);
        }

        Ok(())
    }

    /// Query parameters for `page`. Unset fields are omitted.
    pub fn query_params(&self, page: u32) -> Vec<(String, String)> {
        let mut params = Vec::new();

        if let Some(stock_type) = self.stock_type {
            params.push(("stock_type".to_string(), stock_type.to_string()));
        }
        for make in &self.makes {
            params.push(("makes[]".to_string(), slug(make)));
        }
        for model in &self.models {
            params.push(("models[]".to_string(), slug(model)));
        }
        if let Some(min) = self.price_min {
            params.push(("list_price_min".to_string(), min.to_string()));
        }
        if let Some(max) = self.price_max {
            params.push(("list_price_max".to_string(), max.to_string()));
        }
        if let Some(zip) = self.zip_code.as_deref().map(str::trim).filter(|z| !z.is_empty()) {
            params.push(("zip".to_string(), zip.to_string()));
        }
        if let Some(distance) = self.max_distance {
            params.push(("maximum_distance".to_string(), distance.to_string()));
        }
        if let Some(min) = self.year_min {
            params.push(("year_min".to_string(), min.to_string()));
        }
        if let Some(max) = self.year_max {
            params.push(("year_max".to_string(), max.to_string()));
        }
        if let Some(max) = self.mileage_max {
            params.push(("mileage_max".to_string(), max.to_string()));
        }
        for style in &self.body_styles {
            params.push(("body_style_slugs[]".to_string(), slug(style)));
        }
        for fuel in &self.fuel_types {
            params.push(("fuel_slugs[]".to_string(), slug(fuel)));
        }
        params.push(("page".to_string(), page.to_string()));

        params
    }

    /// Short human-readable description used in logs
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.makes.is_empty() {
            parts.push(format!("makes={}", self.makes.join("|")));
        }
        if !self.models.is_empty() {
            parts.push(format!("models={}", self.models.join("|")));
        }
        if self.year_min.is_some() || self.year_max.is_some() {
            parts.push(format!(
                "years={}..{}",
                self.year_min.map(|y| y.to_string()).unwrap_or_default(),
                self.year_max.map(|y| y.to_string()).unwrap_or_default()
            ));
        }
        if let Some(zip) = &self.zip_code {
            parts.push(format!("zip={zip}"));
        }
        parts.push(format!("pages={}+{}", self.start_page, self.max_pages));
        parts.join(" ")
    }
}

fn slug(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}
