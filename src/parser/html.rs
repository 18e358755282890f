//! Search results HTML extraction

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::CardFields;

pub(super) fn selector(css: &str) -> Selector {
    // Selectors are compile-time literals; a parse failure is a programming error.
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e:?}"))
}

static CONTAINER: Lazy<Selector> =
    Lazy::new(|| selector("#vehicle-cards-container, div.vehicle-cards"));
static CARD: Lazy<Selector> = Lazy::new(|| selector("div.vehicle-card"));
static LINK: Lazy<Selector> =
    Lazy::new(|| selector("a.vehicle-card-link, a[href*='/vehicledetail/']"));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("h2.title, .title"));
static PRICE: Lazy<Selector> = Lazy::new(|| selector(".primary-price"));
static MILEAGE: Lazy<Selector> = Lazy::new(|| selector(".mileage"));
static LOCATION: Lazy<Selector> = Lazy::new(|| selector(".miles-from, .dealer-location"));
static IMAGE: Lazy<Selector> = Lazy::new(|| selector("img.vehicle-image, img"));
static EMBEDDED_FEED: Lazy<Selector> =
    Lazy::new(|| selector(r#"script#search-live-listings[type="application/json"]"#));

/// Whether the document carries the results container
pub fn has_results_container(document: &Html) -> bool {
    document.select(&CONTAINER).next().is_some()
}

/// Text of the embedded JSON listing feed, if present
pub fn embedded_feed(document: &Html) -> Option<String> {
    document
        .select(&EMBEDDED_FEED)
        .next()
        .map(|script| script.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
}

/// Pull raw fields out of every card inside the results container
pub fn extract_cards(document: &Html) -> Vec<CardFields> {
    document
        .select(&CONTAINER)
        .flat_map(|container| container.select(&CARD))
        .map(|card| card_fields(&card))
        .collect()
}

fn card_fields(card: &ElementRef<'_>) -> CardFields {
    let link = card.select(&LINK).next();
    let image = card.select(&IMAGE).next().and_then(|img| {
        img.value()
            .attr("src")
            .filter(|src| !src.trim().is_empty() && !src.trim_start().starts_with("data:"))
            .or_else(|| img.value().attr("data-src"))
            .map(str::to_string)
    });

    CardFields {
        site_id: card
            .value()
            .attr("data-listing-id")
            .or_else(|| link.and_then(|a| a.value().attr("data-listing-id")))
            .map(str::to_string),
        vin: card.value().attr("data-vin").map(str::to_string),
        href: link.and_then(|a| a.value().attr("href")).map(str::to_string),
        title: text_of(card, &TITLE),
        price: text_of(card, &PRICE),
        mileage: text_of(card, &MILEAGE),
        location: text_of(card, &LOCATION),
        image,
        ..CardFields::default()
    }
}

fn text_of(card: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    card.select(selector)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
}
