//! Scrape command and top-level CLI definition

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use super::CliError;
use crate::cancel::SharedCancel;
use crate::config::PipelineConfig;
use crate::filter::{FilterCriteria, StockType};
use crate::pipeline::{Job, JobStatus};
use crate::service::ScrapeService;

/// How often the spinner refreshes from the job snapshot
const PROGRESS_TICK: Duration = Duration::from_millis(200);

/// Vehicle listing scraper and CMS sync
#[derive(Parser, Debug)]
#[command(name = "listing-sync")]
#[command(about = "Scrape vehicle listings into a CSV snapshot and sync them to a CMS", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// JSON config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Snapshot CSV path (overrides the config file)
    #[arg(long, global = true)]
    pub snapshot: Option<PathBuf>,

    /// Attempts per request, first try included (overrides the config file)
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_retries: Option<u32>,

    /// Serve Prometheus metrics on this address (e.g., 127.0.0.1:9000)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Config file (if any), then environment, then flags
    pub fn load_config(&self) -> Result<PipelineConfig, CliError> {
        let mut config = PipelineConfig::load(self.config.as_deref())?;
        if let Some(snapshot) = &self.snapshot {
            config.snapshot_path = snapshot.clone();
        }
        if let Some(attempts) = self.max_retries {
            config.retry.max_attempts = attempts;
        }
        config.validate()?;
        Ok(config)
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scrape listings, update the snapshot and sync the changes
    Scrape(ScrapeArgs),

    /// Inspect or restore the CSV snapshot
    Snapshot(super::SnapshotCommand),

    /// Read from or reset the remote store
    Remote(super::RemoteCommand),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Scrape command arguments
#[derive(Parser, Debug, Default)]
pub struct ScrapeArgs {
    /// Make to include (repeatable)
    #[arg(long = "make")]
    pub makes: Vec<String>,

    /// Model slug to include, e.g. toyota-camry (repeatable)
    #[arg(long = "model")]
    pub models: Vec<String>,

    /// Inventory class: all, new, used or cpo
    #[arg(long)]
    pub stock_type: Option<StockType>,

    /// Earliest model year
    #[arg(long)]
    pub year_min: Option<u16>,

    /// Latest model year
    #[arg(long)]
    pub year_max: Option<u16>,

    /// Lowest list price
    #[arg(long)]
    pub price_min: Option<u64>,

    /// Highest list price
    #[arg(long)]
    pub price_max: Option<u64>,

    /// Highest mileage
    #[arg(long)]
    pub mileage_max: Option<u64>,

    /// Search centre zip code
    #[arg(long)]
    pub zip: Option<String>,

    /// Search radius in miles (requires --zip)
    #[arg(long)]
    pub distance: Option<u32>,

    /// Body style slug, e.g. suv (repeatable)
    #[arg(long = "body-style")]
    pub body_styles: Vec<String>,

    /// Fuel type slug, e.g. hybrid (repeatable)
    #[arg(long = "fuel-type")]
    pub fuel_types: Vec<String>,

    /// First result page
    #[arg(long, default_value_t = 1)]
    pub start_page: u32,

    /// Number of pages to fetch at most
    #[arg(long, default_value_t = 1)]
    pub max_pages: u32,

    /// Minimum delay between page requests in milliseconds
    #[arg(long)]
    pub min_interval_ms: Option<u64>,

    /// Update the snapshot only, do not push to the remote
    #[arg(long, default_value_t = false)]
    pub no_sync: bool,

    /// Visit each listing's detail page for VIN, colors and features
    #[arg(long, default_value_t = false)]
    pub details: bool,
}

impl ScrapeArgs {
    /// Filter described by the flags
    pub fn filter(&self) -> FilterCriteria {
        FilterCriteria {
            stock_type: self.stock_type,
            makes: self.makes.clone(),
            models: self.models.clone(),
            year_min: self.year_min,
            year_max: self.year_max,
            price_min: self.price_min,
            price_max: self.price_max,
            mileage_max: self.mileage_max,
            zip_code: self.zip.clone(),
            max_distance: self.distance,
            body_styles: self.body_styles.clone(),
            fuel_types: self.fuel_types.clone(),
            start_page: self.start_page,
            max_pages: self.max_pages,
        }
    }

    /// Run one job to completion, forwarding `cancel` (Ctrl+C) to it
    pub async fn execute(&self, cli: &Cli, cancel: SharedCancel) -> Result<(), CliError> {
        let filter = self.filter();
        filter.validate()?;

        let mut config = cli.load_config()?;
        if let Some(interval) = self.min_interval_ms {
            config.site.min_request_interval_ms = interval;
        }
        if self.no_sync {
            config.remote.base_url.clear();
        }
        if self.details {
            config.site.fetch_details = true;
        }
        if filter.max_pages > config.site.max_pages_cap {
            warn!(
                requested = filter.max_pages,
                cap = config.site.max_pages_cap,
                "Page limit above the configured cap, capping"
            );
        }

        let service = ScrapeService::from_config(&config)?;
        let job_id = service.start(filter)?;
        info!(job_id, snapshot = %config.snapshot_path.display(), "Scrape started");

        let progress = create_spinner(cli.output_format);
        let mut ticker = tokio::time::interval(PROGRESS_TICK);
        let mut cancel_forwarded = false;

        let job = loop {
            tokio::select! {
                job = service.wait() => break job,
                _ = cancel.cancelled(), if !cancel_forwarded => {
                    cancel_forwarded = true;
                    service.cancel();
                    progress.set_message("cancelling after the current page...");
                }
                _ = ticker.tick() => {
                    if let Some(job) = service.status() {
                        progress.set_message(progress_message(&job));
                    }
                }
            }
        };
        progress.finish_and_clear();

        let job = job.ok_or_else(|| CliError::InvalidArgument("job vanished".to_string()))?;
        match cli.output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&job)?),
            OutputFormat::Human => output_human(&job),
        }

        if job.status == JobStatus::Failed {
            return Err(CliError::JobFailed {
                id: job.id,
                reason: job.errors.join("; "),
            });
        }
        Ok(())
    }
}

fn create_spinner(format: OutputFormat) -> ProgressBar {
    if format == OutputFormat::Json {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("starting");
    pb
}

fn progress_message(job: &Job) -> String {
    let p = &job.progress;
    format!(
        "{} | pages {} ok / {} failed | {} listings",
        job.status, p.pages_fetched, p.pages_failed, p.records_parsed
    )
}

fn output_human(job: &Job) {
    let p = &job.progress;
    let marker = match job.status {
        JobStatus::Succeeded => "✓",
        JobStatus::Cancelled => "⏹",
        _ => "✗",
    };
    println!("{marker} Job {} {}", job.id, job.status);
    if let Some(reason) = job.stop_reason {
        println!("  Stopped: {reason}");
    }
    println!(
        "  Pages: {} fetched, {} failed",
        p.pages_fetched, p.pages_failed
    );
    println!(
        "  Listings: {} parsed, {} skipped, {} rows in snapshot",
        p.records_parsed, p.records_skipped, p.records_written
    );
    if p.details_fetched > 0 || p.details_failed > 0 {
        println!(
            "  Details: {} fetched, {} failed",
            p.details_fetched, p.details_failed
        );
    }
    if p.records_synced > 0 || p.records_sync_failed > 0 {
        println!(
            "  Sync: {} confirmed, {} not confirmed",
            p.records_synced, p.records_sync_failed
        );
    }
    for warning in &job.warnings {
        println!("  ⚠ {warning}");
    }
    for error in &job.errors {
        println!("  ✗ {error}");
    }
}

/// Summary line used by the JSON output of other commands
pub(crate) fn status_json(ok: bool, message: &str) -> serde_json::Value {
    json!({ "ok": ok, "message": message })
}
