//! Filter to request URL, and config loading

use listing_sync::config::{ConfigError, PipelineConfig, ENV_REMOTE_URL, ENV_REMOTE_USER};
use listing_sync::fetcher::SiteConfig;
use listing_sync::filter::{FilterCriteria, FilterError, StockType};
use url::Url;

fn request_url(filter: &FilterCriteria, page: u32) -> Url {
    let config = SiteConfig::default();
    let mut url = Url::parse(&config.search_url()).unwrap();
    url.query_pairs_mut().extend_pairs(filter.query_params(page));
    url
}

#[test]
fn test_request_url_encoding() {
    let filter = FilterCriteria {
        stock_type: Some(StockType::Cpo),
        makes: vec!["Mercedes Benz".to_string()],
        price_max: Some(40_000),
        ..FilterCriteria::default()
    };
    let url = request_url(&filter, 3);

    assert_eq!(url.path(), "/shopping/results/");
    assert_eq!(
        url.query(),
        Some("stock_type=cpo&makes%5B%5D=mercedes-benz&list_price_max=40000&page=3")
    );
}

#[test]
fn test_page_is_always_last_and_single() {
    let filter = FilterCriteria::for_make("Honda").with_start_page(4);
    for page in [4, 5, 6] {
        let params = filter.query_params(page);
        assert_eq!(params.last(), Some(&("page".to_string(), page.to_string())));
        assert_eq!(params.iter().filter(|(k, _)| k == "page").count(), 1);
    }
}

#[test]
fn test_blank_zip_is_omitted() {
    let filter = FilterCriteria {
        zip_code: Some("   ".to_string()),
        ..FilterCriteria::default()
    };
    assert!(filter.query_params(1).iter().all(|(k, _)| k != "zip"));

    let with_distance = FilterCriteria {
        max_distance: Some(30),
        ..filter
    };
    assert_eq!(with_distance.validate(), Err(FilterError::DistanceWithoutZip));
}

#[test]
fn test_price_range_validation() {
    let filter = FilterCriteria {
        price_min: Some(30_000),
        price_max: Some(20_000),
        ..FilterCriteria::default()
    };
    assert_eq!(
        filter.validate(),
        Err(FilterError::InvertedRange {
            field: "price",
            min: 30_000,
            max: 20_000
        })
    );

    let equal = FilterCriteria {
        price_min: Some(20_000),
        ..filter
    };
    assert!(equal.validate().is_ok());
}

#[test]
fn test_summary_names_scope() {
    let filter = FilterCriteria {
        year_min: Some(2018),
        zip_code: Some("60601".to_string()),
        ..FilterCriteria::for_make("Toyota").with_max_pages(3)
    };
    assert_eq!(filter.summary(), "makes=Toyota years=2018.. zip=60601 pages=1+3");
}

#[test]
fn test_config_file_keeps_defaults_for_missing_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"snapshot_path": "out/cars.csv", "site": {"max_pages_cap": 5}}"#,
    )
    .unwrap();

    let config = PipelineConfig::from_file(&path).unwrap();
    assert_eq!(config.site.max_pages_cap, 5);
    assert_eq!(config.site.base_url, SiteConfig::default().base_url);
    assert_eq!(
        config.sync_state_path(),
        std::path::PathBuf::from("out/sync_state.json")
    );
    assert!(!config.remote.is_configured());
}

#[test]
fn test_config_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        PipelineConfig::from_file(&path),
        Err(ConfigError::Parse { .. })
    ));
    assert!(matches!(
        PipelineConfig::from_file(&dir.path().join("absent.json")),
        Err(ConfigError::Read { .. })
    ));

    let mut config = PipelineConfig::default();
    config.site.max_pages_cap = 0;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

    let mut details = PipelineConfig::default();
    details.site.fetch_details = true;
    assert!(details.validate().is_ok());
    details.site.max_details_per_job = 0;
    assert!(matches!(
        details.validate(),
        Err(ConfigError::Invalid {
            field: "site.max_details_per_job",
            ..
        })
    ));
}

#[test]
fn test_environment_supplies_remote() {
    let mut config = PipelineConfig::default();
    config.apply_env(|key| match key {
        k if k == ENV_REMOTE_URL => Some("https://cms.example.com".to_string()),
        k if k == ENV_REMOTE_USER => Some("  ".to_string()),
        _ => None,
    });

    assert!(config.remote.is_configured());
    assert_eq!(config.remote.base_url, "https://cms.example.com");
    assert_eq!(config.remote.username, None);
    assert!(config.validate().is_ok());
}
