//! Page parsers
//!
//! A fetched page is first classified into a [`PageShape`], then handed to
//! the matching extractor. Both extractors produce [`CardFields`], which are
//! turned into [`Listing`]s by one shared routine so the two shapes
//! normalize identically.
//!
//! Parsing is pure: the same [`RawPage`] always yields the same records.

use crate::fetcher::RawPage;
use crate::identifier::{self, DERIVED_PREFIX};
use crate::{Listing, MODEL_YEARS};
use scraper::Html;
use serde_json::Value;
use tracing::debug;

pub mod detail;
pub mod html;
pub mod json;
pub mod normalize;

use normalize::{clean_location, clean_number, clean_text, parse_title, resolve_url, upgrade_image};

/// Parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Page matches no known layout (site redesign, bot wall, error page)
    #[error("page {page}: unrecognized page structure: {detail}")]
    StructuralDrift {
        /// Page number
        page: u32,
        /// What was looked for
        detail: String,
    },

    /// JSON feed that cannot be read
    #[error("page {page}: malformed listing feed: {detail}")]
    MalformedFeed {
        /// Page number
        page: u32,
        /// Decoder message
        detail: String,
    },
}

impl ParseError {
    /// Page the error belongs to
    pub fn page(&self) -> u32 {
        match self {
            ParseError::StructuralDrift { page, .. } | ParseError::MalformedFeed { page, .. } => {
                *page
            }
        }
    }
}

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Recognized page layouts
#[derive(Debug)]
pub enum PageShape {
    /// HTML document with the search results container
    SearchResults(Html),
    /// Standalone JSON document or embedded JSON listing feed
    JsonFeed(Value),
}

impl PageShape {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            PageShape::SearchResults(_) => "search_results",
            PageShape::JsonFeed(_) => "json_feed",
        }
    }
}

/// Listings extracted from one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    /// Records in page order
    pub listings: Vec<Listing>,
    /// Cards dropped because no identifier or link could be derived
    pub skipped: usize,
}

/// Raw, unnormalized fields of one listing card
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardFields {
    /// Site-assigned id, if the card carries one
    pub site_id: Option<String>,
    /// Vehicle identification number
    pub vin: Option<String>,
    /// Link to the detail page, possibly relative
    pub href: Option<String>,
    /// Listing title (`YEAR MAKE MODEL...`)
    pub title: Option<String>,
    /// Explicit make, preferred over the title
    pub make: Option<String>,
    /// Explicit model, preferred over the title
    pub model: Option<String>,
    /// Explicit year text, preferred over the title
    pub year: Option<String>,
    /// Price text
    pub price: Option<String>,
    /// Mileage text
    pub mileage: Option<String>,
    /// Location text
    pub location: Option<String>,
    /// Image URL, possibly relative
    pub image: Option<String>,
}

/// Classify a page.
///
/// # Errors
/// [`ParseError::MalformedFeed`] for JSON that does not decode,
/// [`ParseError::StructuralDrift`] for anything else unrecognized.
pub fn detect_shape(raw: &RawPage) -> ParseResult<PageShape> {
    let trimmed = raw.body.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map(PageShape::JsonFeed)
            .map_err(|e| ParseError::MalformedFeed {
                page: raw.page,
                detail: e.to_string(),
            });
    }

    let document = Html::parse_document(&raw.body);
    if html::has_results_container(&document) {
        return Ok(PageShape::SearchResults(document));
    }

    if let Some(feed) = html::embedded_feed(&document) {
        return serde_json::from_str(&feed)
            .map(PageShape::JsonFeed)
            .map_err(|e| ParseError::MalformedFeed {
                page: raw.page,
                detail: format!("embedded feed: {e}"),
            });
    }

    Err(ParseError::StructuralDrift {
        page: raw.page,
        detail: "no results container or listing feed found".to_string(),
    })
}

/// Parse a page into listings, reporting skipped cards.
pub fn parse_page(raw: &RawPage) -> ParseResult<ParsedPage> {
    let shape = detect_shape(raw)?;
    let label = shape.label();

    let cards = match shape {
        PageShape::SearchResults(document) => html::extract_cards(&document),
        PageShape::JsonFeed(value) => json::extract_cards(&value, raw.page)?,
    };

    let total = cards.len();
    let listings: Vec<Listing> = cards
        .into_iter()
        .filter_map(|card| build_listing(card, raw))
        .collect();
    let skipped = total - listings.len();

    debug!(
        page = raw.page,
        shape = label,
        listings = listings.len(),
        skipped,
        "Parsed result page"
    );

    Ok(ParsedPage { listings, skipped })
}

/// Parse a page into listings.
pub fn parse(raw: &RawPage) -> ParseResult<Vec<Listing>> {
    parse_page(raw).map(|parsed| parsed.listings)
}

/// Normalize one card. `None` when neither an id nor a link can be derived.
pub fn build_listing(card: CardFields, raw: &RawPage) -> Option<Listing> {
    let resolved_href = card.href.as_deref().and_then(|h| resolve_url(&raw.url, h));
    let id = identifier::resolve_listing_id(
        card.site_id.as_deref(),
        resolved_href.as_deref().unwrap_or_default(),
        card.vin.as_deref(),
    )?;

    let url = match resolved_href {
        Some(url) => url,
        None if !id.starts_with(DERIVED_PREFIX) => {
            resolve_url(&raw.url, &format!("/vehicledetail/{id}/"))?
        }
        None => return None,
    };

    let title = card.title.as_deref().map(parse_title).unwrap_or_default();
    let year = card
        .year
        .as_deref()
        .and_then(clean_number)
        .and_then(|y| u16::try_from(y).ok())
        .or(title.year)
        .filter(|y| MODEL_YEARS.contains(y));

    let listing = Listing {
        id,
        make: card.make.as_deref().and_then(clean_text).or(title.make),
        model: card.model.as_deref().and_then(clean_text).or(title.model),
        year,
        price: card.price.as_deref().and_then(clean_number),
        mileage: card.mileage.as_deref().and_then(clean_number),
        location: card.location.as_deref().and_then(clean_location),
        url,
        image_url: card
            .image
            .as_deref()
            .filter(|src| !src.trim_start().starts_with("data:"))
            .and_then(|src| resolve_url(&raw.url, src))
            .map(|src| upgrade_image(&src)),
        scraped_at: raw.fetched_at,
        details: None,
    };

    match listing.validate() {
        Ok(()) => Some(listing),
        Err(reason) => {
            debug!(page = raw.page, id = %listing.id, %reason, "Dropped invalid card");
            None
        }
    }
}

#[cfg(test)]
pub(crate) fn raw_page(page: u32, body: &str) -> RawPage {
    use chrono::TimeZone;
    RawPage {
        page,
        url: format!("https://www.cars.com/shopping/results/?page={page}"),
        body: body.to_string(),
        fetched_at: chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    }
}
