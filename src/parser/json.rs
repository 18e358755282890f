//! JSON listing feed extraction
//!
//! Feeds come either as a standalone document or embedded in the results
//! page. Field names vary between feed versions, so every field is looked up
//! under a short list of aliases and numbers are accepted as JSON numbers or
//! formatted strings.

use serde_json::{Map, Value};

use super::{CardFields, ParseError, ParseResult};

const LIST_KEYS: &[&str] = &["listings", "results", "vehicles", "cars_data"];

/// Pull raw fields out of every entry of the feed
///
/// # Errors
/// [`ParseError::MalformedFeed`] when no listing array can be located.
pub fn extract_cards(feed: &Value, page: u32) -> ParseResult<Vec<CardFields>> {
    let entries = match feed {
        Value::Array(entries) => entries,
        Value::Object(object) => LIST_KEYS
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_array))
            .ok_or_else(|| ParseError::MalformedFeed {
                page,
                detail: format!("no listing array under any of {LIST_KEYS:?}"),
            })?,
        _ => {
            return Err(ParseError::MalformedFeed {
                page,
                detail: "feed is neither an object nor an array".to_string(),
            })
        }
    };

    Ok(entries
        .iter()
        .map(|entry| match entry.as_object() {
            Some(object) => card_fields(object),
            None => CardFields::default(),
        })
        .collect())
}

fn card_fields(entry: &Map<String, Value>) -> CardFields {
    CardFields {
        site_id: text(entry, &["listing_id", "listingId", "id"]),
        vin: text(entry, &["vin", "VIN"]),
        href: text(entry, &["url", "listing_url", "vdp_url", "detail_url"]),
        title: text(entry, &["title", "name", "heading"]),
        make: text(entry, &["make"]),
        model: model(entry),
        year: text(entry, &["year", "model_year"]),
        price: text(entry, &["price", "list_price", "listPrice"]),
        mileage: text(entry, &["mileage", "miles", "odometer"]),
        location: text(entry, &["location", "dealer_location"]).or_else(|| dealer_location(entry)),
        image: text(entry, &["image_url", "primary_thumbnail", "photo", "image"]),
    }
}

fn model(entry: &Map<String, Value>) -> Option<String> {
    let model = text(entry, &["model"])?;
    match text(entry, &["trim"]) {
        Some(trim) if !trim.trim().is_empty() => Some(format!("{model} {trim}")),
        _ => Some(model),
    }
}

fn dealer_location(entry: &Map<String, Value>) -> Option<String> {
    let dealer = entry.get("dealer")?.as_object()?;
    let city = text(dealer, &["city"]);
    let state = text(dealer, &["state"]);
    match (city, state) {
        (Some(city), Some(state)) => Some(format!("{city}, {state}")),
        (Some(single), None) | (None, Some(single)) => Some(single),
        (None, None) => None,
    }
}

/// First alias holding a string or number, as text
fn text(entry: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match entry.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
