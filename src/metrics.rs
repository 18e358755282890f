//! Observability metrics for the scrape pipeline
//!
//! Counters and histograms go through the `metrics` facade. Without an
//! installed recorder every call is a no-op, so library users and tests pay
//! nothing. The CLI installs a Prometheus exporter when `--metrics-addr` is
//! given.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

static CORRELATION_COUNTER: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(0));

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: a second call logs and returns `Ok`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        METRICS_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(format!("Failed to install Prometheus exporter: {e}").into());
    }

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "HTTP requests made to the listing site and the remote system"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_counter!("http_retries_total", Unit::Count, "Retry attempts");
    describe_histogram!(
        "politeness_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for the minimum request interval"
    );
    describe_counter!(
        "pages_fetched_total",
        Unit::Count,
        "Result pages fetched, labelled by outcome"
    );
    describe_counter!(
        "listings_parsed_total",
        Unit::Count,
        "Listings extracted from fetched pages"
    );
    describe_counter!(
        "listings_skipped_total",
        Unit::Count,
        "Listing cards dropped because no identifier could be derived"
    );
    describe_counter!(
        "sync_batches_total",
        Unit::Count,
        "Upsert batches sent to the remote system, labelled by outcome"
    );
    describe_counter!(
        "sync_records_total",
        Unit::Count,
        "Records confirmed or rejected by the remote system"
    );
    describe_counter!(
        "jobs_completed_total",
        Unit::Count,
        "Scrape jobs reaching a terminal status"
    );

    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Whether a Prometheus exporter was installed
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.load(Ordering::SeqCst)
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let next = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{next:08x}")
}

/// Timing and outcome of one HTTP request
pub struct HttpRequestMetrics {
    endpoint: &'static str,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start recording a request against `endpoint` (a static label such as "search")
    pub fn start(endpoint: &'static str, attempt: u32) -> Self {
        let correlation_id = generate_correlation_id();
        debug!(
            correlation_id = %correlation_id,
            endpoint,
            attempt,
            "Starting HTTP request"
        );

        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record a response with a status code
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint,
            "status" => status_code.to_string(),
        )
        .increment(1);
        histogram!("http_request_duration_seconds", "endpoint" => self.endpoint)
            .record(duration.as_secs_f64());

        if status_code == 429 {
            warn!(
                correlation_id = %self.correlation_id,
                endpoint = self.endpoint,
                attempt = self.attempt,
                "Rate limit response (429)"
            );
        }

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = self.endpoint,
            status = status_code,
            duration_ms = duration.as_millis() as u64,
            "HTTP request completed"
        );
    }

    /// Record a transport failure (no status code)
    pub fn record_network_error(&self, error: &str) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint,
            "status" => "network_error",
        )
        .increment(1);
        histogram!("http_request_duration_seconds", "endpoint" => self.endpoint)
            .record(duration.as_secs_f64());

        warn!(
            correlation_id = %self.correlation_id,
            endpoint = self.endpoint,
            attempt = self.attempt,
            duration_ms = duration.as_millis() as u64,
            error,
            "Network error"
        );
    }

    /// Correlation ID for this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Count one retry against `target`
pub fn record_retry(target: &str) {
    counter!("http_retries_total", "target" => target.to_string()).increment(1);
}

/// Record time spent honouring the minimum request interval
pub fn record_politeness_wait(waited: Duration) {
    histogram!("politeness_wait_seconds").record(waited.as_secs_f64());
}

/// Outcome label for a fetched page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Fetched and parsed
    Parsed,
    /// Fetch failed after retries or with a client error
    FetchFailed,
    /// Fetched but could not be parsed
    ParseFailed,
}

impl PageOutcome {
    fn label(self) -> &'static str {
        match self {
            PageOutcome::Parsed => "parsed",
            PageOutcome::FetchFailed => "fetch_failed",
            PageOutcome::ParseFailed => "parse_failed",
        }
    }
}

/// Count a page and, when parsed, the listings it produced
pub fn record_page(outcome: PageOutcome, listings: usize, skipped: usize) {
    counter!("pages_fetched_total", "outcome" => outcome.label()).increment(1);
    if listings > 0 {
        counter!("listings_parsed_total").increment(listings as u64);
    }
    if skipped > 0 {
        counter!("listings_skipped_total").increment(skipped as u64);
    }
}

/// Count one upsert batch and its per-record outcome
pub fn record_sync_batch(accepted: usize, rejected: usize, transport_failed: bool) {
    let outcome = if transport_failed {
        "failed"
    } else if rejected > 0 {
        "partial"
    } else {
        "ok"
    };
    counter!("sync_batches_total", "outcome" => outcome).increment(1);
    counter!("sync_records_total", "outcome" => "accepted").increment(accepted as u64);
    counter!("sync_records_total", "outcome" => "rejected").increment(rejected as u64);
}

/// Lifecycle metrics for one scrape job
pub struct JobMetrics {
    job_id: u64,
    start_time: Instant,
}

impl JobMetrics {
    /// Start tracking a job
    pub fn start(job_id: u64, filter_summary: &str) -> Self {
        info!(job_id, filter = %filter_summary, "Scrape job started");
        Self {
            job_id,
            start_time: Instant::now(),
        }
    }

    /// Record a terminal status
    pub fn record_terminal(&self, status: &str, records_written: usize) {
        let duration = self.start_time.elapsed();
        counter!("jobs_completed_total", "status" => status.to_string()).increment(1);

        if status == "failed" {
            error!(
                job_id = self.job_id,
                status,
                duration_secs = duration.as_secs(),
                "Scrape job failed"
            );
        } else {
            info!(
                job_id = self.job_id,
                status,
                records_written,
                duration_secs = duration.as_secs(),
                "Scrape job finished"
            );
        }
    }
}
