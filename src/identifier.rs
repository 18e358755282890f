//! Listing identifier derivation
//!
//! The marketplace assigns every listing an id that appears in its detail
//! URL (`/vehicledetail/<id>/`) and usually on the result card itself. When
//! neither is available an id is derived from the canonical URL plus VIN, so
//! the same physical listing keeps the same id across scrapes.

use sha2::{Digest, Sha256};
use url::Url;

/// Prefix marking derived (hash-based) identifiers
pub const DERIVED_PREFIX: &str = "h-";

const DETAIL_SEGMENT: &str = "vehicledetail";

/// Extract the site-assigned id from a listing detail URL.
///
/// # Examples
///
/// ```
/// use listing_sync::identifier::listing_id_from_url;
///
/// let id = listing_id_from_url("https://www.cars.com/vehicledetail/9f1c2a/?attr=1");
/// assert_eq!(id.as_deref(), Some("9f1c2a"));
/// assert_eq!(listing_id_from_url("https://www.cars.com/shopping/"), None);
/// ```
pub fn listing_id_from_url(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    segments
        .by_ref()
        .find(|segment| *segment == DETAIL_SEGMENT)?;
    segments.next().and_then(sanitize)
}

/// Canonical form of a listing URL: no query, no fragment, no trailing slash.
pub fn canonical_url(url: &str) -> String {
    match Url::parse(url.trim()) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.as_str().trim_end_matches('/').to_string()
        }
        Err(_) => url
            .trim()
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string(),
    }
}

/// Derive a stable id from the canonical URL and VIN.
///
/// Returns `None` when both inputs are empty.
pub fn derived_id(url: &str, vin: Option<&str>) -> Option<String> {
    let canonical = canonical_url(url);
    let vin = vin.map(|v| v.trim().to_uppercase()).unwrap_or_default();
    if canonical.is_empty() && vin.is_empty() {
        return None;
    }

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.update([0x1f]);
    hasher.update(vin.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    Some(format!("{DERIVED_PREFIX}{}", &digest[..16]))
}

/// Pick the listing id: explicit site id, then the detail URL, then a derived id.
pub fn resolve_listing_id(site_id: Option<&str>, url: &str, vin: Option<&str>) -> Option<String> {
    site_id
        .and_then(sanitize)
        .or_else(|| listing_id_from_url(url))
        .or_else(|| derived_id(url, vin))
}

fn sanitize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let valid = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| trimmed.to_string())
}
