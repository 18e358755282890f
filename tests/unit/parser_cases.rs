//! Parser behaviour on whole pages

use chrono::{TimeZone, Utc};
use listing_sync::fetcher::RawPage;
use listing_sync::identifier::{derived_id, DERIVED_PREFIX};
use listing_sync::parser::{self, ParseError};

use crate::support::{card, listing_id, results_page, toyota_page};

fn page(number: u32, url: &str, body: &str) -> RawPage {
    RawPage {
        page: number,
        url: url.to_string(),
        body: body.to_string(),
        fetched_at: Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap(),
    }
}

fn results(number: u32, body: &str) -> RawPage {
    page(
        number,
        &format!("https://www.cars.com/shopping/results/?page={number}"),
        body,
    )
}

#[test]
fn test_full_results_page() {
    let raw = results(2, &toyota_page(2, 12));
    let parsed = parser::parse_page(&raw).unwrap();

    assert_eq!(parsed.listings.len(), 12);
    assert_eq!(parsed.skipped, 0);

    let ids: Vec<String> = parsed.listings.iter().map(|l| l.id.clone()).collect();
    let expected: Vec<String> = (0..12).map(|i| listing_id(2, i)).collect();
    assert_eq!(ids, expected);

    let third = &parsed.listings[2];
    assert_eq!(third.year, Some(2017));
    assert_eq!(third.make.as_deref(), Some("Toyota"));
    assert_eq!(third.model.as_deref(), Some("Camry LE"));
    assert_eq!(third.price, Some(18_500));
    assert_eq!(third.mileage, Some(22_000));
    assert_eq!(third.location.as_deref(), Some("Naperville, IL"));
    assert_eq!(third.scraped_at, raw.fetched_at);
    for listing in &parsed.listings {
        assert!(listing.validate().is_ok());
    }
}

#[test]
fn test_embedded_feed_inside_results_shell() {
    let body = r#"<!DOCTYPE html><html><head>
        <script type="application/json" id="search-live-listings">
          {"results": [
            {"listingId": "feed-1", "detail_url": "/vehicledetail/feed-1/",
             "title": "Certified 2020 Lexus RX 350", "miles": 30500,
             "listPrice": "$38,900", "dealer_location": "Evanston, IL (4 mi.)"}
          ]}
        </script></head><body><div id="app"></div></body></html>"#;
    let listings = parser::parse(&results(1, body)).unwrap();

    assert_eq!(listings.len(), 1);
    let only = &listings[0];
    assert_eq!(only.id, "feed-1");
    assert_eq!(only.year, Some(2020));
    assert_eq!(only.make.as_deref(), Some("Lexus"));
    assert_eq!(only.model.as_deref(), Some("RX 350"));
    assert_eq!(only.price, Some(38_900));
    assert_eq!(only.mileage, Some(30_500));
    assert_eq!(only.location.as_deref(), Some("Evanston, IL"));
    assert_eq!(only.url, "https://www.cars.com/vehicledetail/feed-1/");
}

#[test]
fn test_bot_wall_is_drift_not_empty() {
    let body = "<html><body><h1>Please verify you are a human</h1></body></html>";
    let err = parser::parse(&results(6, body)).unwrap_err();
    assert!(matches!(err, ParseError::StructuralDrift { page: 6, .. }));
}

#[test]
fn test_malformed_embedded_feed() {
    let body = r#"<html><script type="application/json" id="search-live-listings">{"listings": [</script></html>"#;
    let err = parser::parse(&results(2, body)).unwrap_err();
    assert!(matches!(err, ParseError::MalformedFeed { page: 2, .. }));
}

#[test]
fn test_derived_id_for_link_outside_detail_pages() {
    let promo = |query: &str| {
        format!(
            r#"<div id="vehicle-cards-container">
                 <div class="vehicle-card" data-vin="1hgcm82633a004352">
                   <a class="vehicle-card-link" href="/dealer/promo/spring-sale/?ref={query}">
                     <h2 class="title">2022 Honda Civic Sport</h2>
                   </a>
                 </div>
               </div>"#
        )
    };

    let first = parser::parse(&results(1, &promo("a"))).unwrap();
    let second = parser::parse(&results(1, &promo("b"))).unwrap();

    assert_eq!(first.len(), 1);
    assert!(first[0].id.starts_with(DERIVED_PREFIX));
    assert_eq!(first[0].id, second[0].id);
    assert_eq!(
        Some(first[0].id.clone()),
        derived_id(
            "https://www.cars.com/dealer/promo/spring-sale/",
            Some("1HGCM82633A004352")
        )
    );
}

#[test]
fn test_relative_links_resolve_against_page_url() {
    let body = results_page(&[card("rel-1", "2019 Ford F-150 XLT", 29_000, 51_000)])
        .replace("/vehicledetail/rel-1/", "../vehicledetail/rel-1/")
        .replace("https://img.example.com/small/rel-1.jpg", "/images/small/rel-1.jpg");

    let listings = parser::parse(&page(
        1,
        "https://mirror.example.org/shopping/results/?page=1",
        &body,
    ))
    .unwrap();

    assert_eq!(listings[0].id, "rel-1");
    assert_eq!(
        listings[0].url,
        "https://mirror.example.org/shopping/vehicledetail/rel-1/"
    );
    assert_eq!(
        listings[0].image_url.as_deref(),
        Some("https://mirror.example.org/images/medium/rel-1.jpg")
    );
}

#[test]
fn test_sponsored_cards_are_counted_as_skipped() {
    let mut cards = vec![card("keep-1", "2021 Kia Telluride S", 41_000, 9_000)];
    cards.push(r#"<div class="vehicle-card"><h2 class="title">Sponsored</h2></div>"#.to_string());
    cards.push(card("keep-2", "2021 Kia Sorento LX", 33_000, 14_000));

    let parsed = parser::parse_page(&results(1, &results_page(&cards))).unwrap();
    let ids: Vec<&str> = parsed.listings.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, vec!["keep-1", "keep-2"]);
    assert_eq!(parsed.skipped, 1);
}
