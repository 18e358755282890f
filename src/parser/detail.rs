//! Listing detail page extraction
//!
//! A detail page carries what the result card does not: VIN, the "basics"
//! description list (colors, drivetrain, engine...), feature groups, the
//! estimated monthly payment and the body style hidden in the recall link.
//! Detail fields are optional; a page with neither the basics section nor
//! a listing title is structural drift.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use super::html::selector;
use super::normalize::{clean_number, clean_text, parse_title};
use super::{ParseError, ParseResult};
use crate::fetcher::RawPage;
use crate::{Listing, MODEL_YEARS};

static TITLE: Lazy<Selector> = Lazy::new(|| selector("h1.listing-title"));
static PRICE: Lazy<Selector> = Lazy::new(|| selector("span[data-qa='primary-price']"));
static BASICS: Lazy<Selector> =
    Lazy::new(|| selector(".basics-section dl.fancy-description-list"));
static FEATURES: Lazy<Selector> =
    Lazy::new(|| selector(".features-section dl.fancy-description-list"));
static DT: Lazy<Selector> = Lazy::new(|| selector("dt"));
static DD: Lazy<Selector> = Lazy::new(|| selector("dd"));
static FEATURE_ITEM: Lazy<Selector> = Lazy::new(|| selector("ul.vehicle-features-list li"));
/// Tried in order; the first that yields a number wins
static PAYMENT: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "#payment-result-value",
        "[data-qa='payment-amount']",
        ".payment-amount",
        ".monthly-payment",
    ]
    .into_iter()
    .map(selector)
    .collect()
});
static RECALL_LINK: Lazy<Selector> =
    Lazy::new(|| selector("a[data-linkname='check-recalls']"));

/// Attributes only found on a listing's detail page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleDetails {
    /// Vehicle identification number, upper case
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vin: Option<String>,
    /// Exterior color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exterior_color: Option<String>,
    /// Interior color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interior_color: Option<String>,
    /// Engine description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Transmission description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmission: Option<String>,
    /// Drivetrain (FWD, AWD...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drivetrain: Option<String>,
    /// Fuel type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_type: Option<String>,
    /// Fuel economy as printed (e.g., "27–35")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mpg: Option<String>,
    /// Dealer stock number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_number: Option<String>,
    /// Body style slug from the recall link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_style: Option<String>,
    /// Estimated monthly payment in whole currency units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_payment: Option<u64>,
    /// Feature groups keyed by category (e.g., "safety")
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, Vec<String>>,
}

impl VehicleDetails {
    /// Stable text form used in content hashes
    pub fn canonical_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Everything read from one detail page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailPage {
    /// Listing title (`YEAR MAKE MODEL...`)
    pub title: Option<String>,
    /// Price text
    pub price: Option<String>,
    /// Mileage text from the basics list
    pub mileage: Option<String>,
    /// Detail-only attributes
    pub details: VehicleDetails,
}

/// Parse a detail page.
///
/// # Errors
/// [`ParseError::StructuralDrift`] when the page has neither a listing title
/// nor a basics section.
pub fn parse_detail(raw: &RawPage) -> ParseResult<DetailPage> {
    let document = Html::parse_document(&raw.body);
    let title = first_text(&document, &TITLE);
    let basics = document.select(&BASICS).next();

    if title.is_none() && basics.is_none() {
        return Err(ParseError::StructuralDrift {
            page: raw.page,
            detail: format!("{}: no listing title or basics section", raw.url),
        });
    }

    let mut page = DetailPage {
        title,
        price: first_text(&document, &PRICE),
        ..DetailPage::default()
    };

    if let Some(list) = basics {
        for (key, value) in definition_pairs(&list) {
            let details = &mut page.details;
            match key.as_str() {
                "vin" => details.vin = Some(value.to_uppercase()),
                "exterior_color" => details.exterior_color = Some(value),
                "interior_color" => details.interior_color = Some(value),
                "engine" => details.engine = Some(value),
                "transmission" => details.transmission = Some(value),
                "drivetrain" => details.drivetrain = Some(value),
                "fuel_type" => details.fuel_type = Some(value),
                "mpg" => details.mpg = Some(value),
                "stock" | "stock_" | "stock_number" => details.stock_number = Some(value),
                "mileage" => page.mileage = Some(value),
                _ => {}
            }
        }
    }

    if let Some(list) = document.select(&FEATURES).next() {
        page.details.features = feature_groups(&list);
    }

    page.details.start_payment = PAYMENT.iter().find_map(|payment| {
        document
            .select(payment)
            .find_map(|el| clean_number(&el.text().collect::<String>()))
    });

    page.details.body_style = document
        .select(&RECALL_LINK)
        .find_map(|a| a.value().attr("href"))
        .and_then(body_style_from_href);

    Ok(page)
}

/// Merge a detail page into `listing`.
///
/// Card values win; the detail page only fills what the card lacked.
pub fn enrich(listing: &mut Listing, page: DetailPage) {
    let title = page.title.as_deref().map(parse_title).unwrap_or_default();

    if listing.make.is_none() {
        listing.make = title.make;
    }
    if listing.model.is_none() {
        listing.model = title.model;
    }
    if listing.year.is_none() {
        listing.year = title.year.filter(|y| MODEL_YEARS.contains(y));
    }
    if listing.price.is_none() {
        listing.price = page.price.as_deref().and_then(clean_number);
    }
    if listing.mileage.is_none() {
        listing.mileage = page.mileage.as_deref().and_then(clean_number);
    }
    listing.details = Some(page.details);
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|el| clean_text(&el.text().collect::<Vec<_>>().join(" ")))
}

/// `<dt>`/`<dd>` pairs with the term turned into a snake_case key
fn definition_pairs(list: &ElementRef<'_>) -> Vec<(String, String)> {
    let terms = list.select(&DT);
    let definitions = list.select(&DD);
    terms
        .zip(definitions)
        .filter_map(|(dt, dd)| {
            let key = snake_key(&dt.text().collect::<String>())?;
            let value = clean_text(&dd.text().collect::<Vec<_>>().join(" "))?;
            Some((key, value))
        })
        .collect()
}

fn feature_groups(list: &ElementRef<'_>) -> BTreeMap<String, Vec<String>> {
    list.select(&DT)
        .zip(list.select(&DD))
        .filter_map(|(dt, dd)| {
            let category = snake_key(&dt.text().collect::<String>())?;
            let items: Vec<String> = dd
                .select(&FEATURE_ITEM)
                .filter_map(|li| clean_text(&li.text().collect::<String>()))
                .collect();
            (!items.is_empty()).then_some((category, items))
        })
        .collect()
}

/// Lower case, keep `[a-z0-9 ]`, spaces to underscores
fn snake_key(term: &str) -> Option<String> {
    let kept: String = term
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    let key = kept.split_whitespace().collect::<Vec<_>>().join("_");
    (!key.is_empty()).then_some(key)
}

fn body_style_from_href(href: &str) -> Option<String> {
    let url = Url::parse(href).ok()?;
    let style = url
        .query_pairs()
        .find(|(key, _)| key == "bodystyle")
        .map(|(_, value)| value.into_owned())?;
    clean_text(&style)
}
