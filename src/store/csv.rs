//! CSV row layout of the snapshot
//!
//! One header row, then one row per listing. Missing values are written as
//! [`UNKNOWN`]; timestamps are RFC 3339 in UTC.

use chrono::{DateTime, SecondsFormat, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::{Listing, UNKNOWN};

/// Column order of the snapshot
pub const HEADER: [&str; 10] = [
    "id",
    "make",
    "model",
    "year",
    "price",
    "mileage",
    "location",
    "url",
    "image_url",
    "scraped_at",
];

/// Row-level decoding errors
#[derive(Debug, thiserror::Error)]
pub enum RowError {
    /// Malformed CSV
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Well-formed CSV with a value that does not fit its column
    #[error("line {line}: {message}")]
    Invalid {
        /// 1-based line number
        line: u64,
        /// What was wrong
        message: String,
    },
}

/// CSV record for one listing
#[derive(Debug, Serialize, Deserialize)]
struct ListingRow {
    id: String,
    make: String,
    model: String,
    year: String,
    price: String,
    mileage: String,
    location: String,
    url: String,
    image_url: String,
    scraped_at: String,
}

fn or_unknown<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn known(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty() && trimmed != UNKNOWN).then(|| trimmed.to_string())
}

impl From<&Listing> for ListingRow {
    fn from(listing: &Listing) -> Self {
        Self {
            id: listing.id.clone(),
            make: or_unknown(&listing.make),
            model: or_unknown(&listing.model),
            year: or_unknown(&listing.year),
            price: or_unknown(&listing.price),
            mileage: or_unknown(&listing.mileage),
            location: or_unknown(&listing.location),
            url: listing.url.clone(),
            image_url: or_unknown(&listing.image_url),
            scraped_at: listing
                .scraped_at
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }
}

impl ListingRow {
    fn into_listing(self) -> Result<Listing, String> {
        fn number<T: std::str::FromStr>(column: &str, value: String) -> Result<Option<T>, String> {
            known(value)
                .map(|v| {
                    v.parse::<T>()
                        .map_err(|_| format!("{column}: '{v}' is not a whole number"))
                })
                .transpose()
        }

        if self.id.trim().is_empty() {
            return Err("empty id".to_string());
        }

        let scraped_at = DateTime::parse_from_rfc3339(self.scraped_at.trim())
            .map_err(|e| format!("scraped_at: {e}"))?
            .with_timezone(&Utc);

        Ok(Listing {
            id: self.id.trim().to_string(),
            make: known(self.make),
            model: known(self.model),
            year: number("year", self.year)?,
            price: number("price", self.price)?,
            mileage: number("mileage", self.mileage)?,
            location: known(self.location),
            url: self.url,
            image_url: known(self.image_url),
            scraped_at,
            details: None,
        })
    }
}

/// Write the header and every listing
pub fn write_listings(writer: &mut dyn Write, listings: &[Listing]) -> Result<(), csv::Error> {
    let mut csv_writer = WriterBuilder::new().has_headers(false).from_writer(writer);
    csv_writer.write_record(HEADER)?;
    for listing in listings {
        csv_writer.serialize(ListingRow::from(listing))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Read a snapshot back into listings
pub fn read_listings<R: Read>(reader: R) -> Result<Vec<Listing>, RowError> {
    let mut csv_reader = ReaderBuilder::new().has_headers(true).from_reader(reader);

    let mut listings = Vec::new();
    for result in csv_reader.deserialize::<ListingRow>() {
        let row = result?;
        let line = listings.len() as u64 + 2;
        let listing = row
            .into_listing()
            .map_err(|message| RowError::Invalid { line, message })?;
        listings.push(listing);
    }
    Ok(listings)
}
