mod error;
mod extract;
mod fetcher;
mod images;
mod listing;
mod search;
mod settings;
mod store;
#[cfg(test)]
mod test_support;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;

use extract::Extractor;
use fetcher::{Fetch, HttpFetcher};
use images::ImageStats;
use settings::Settings;
use store::dynamo::DynamoStore;
use store::{ItemStore, UpsertSummary};

const DEFAULT_URL: &str = "https://www.made-in-china.com/productdirectory.do?subaction=hunt&style=b&mode=and&code=0&comProvince=nolimit&order=0&isOpenCorrection=1&org=top&keyword=&file=&searchType=0&word=M3+lip&log_from=4&bv_id=1j9c5mv1s4e9";

#[derive(Parser)]
#[command(
    name = "mic_scraper",
    about = "Scrape made-in-china search results and upsert them into DynamoDB"
)]
struct Cli {
    /// Search URL to scrape
    #[arg(long, default_value = DEFAULT_URL)]
    url: String,
    /// Number of pages to request via the page= parameter
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pages: u32,
    /// Seconds to wait between page requests
    #[arg(long = "delay-sec", default_value = "1.0", value_parser = parse_delay)]
    delay: Duration,
    /// Directory for downloaded images
    #[arg(long, default_value = "data/made-in-china/m3-lip/images")]
    download_dir: PathBuf,
    /// DynamoDB table name
    #[arg(long)]
    table_name: String,
    /// AWS region (default: from the AWS environment/profile)
    #[arg(long)]
    aws_region: Option<String>,
    /// Extra attribute added to every item (repeatable)
    #[arg(long = "extra-attr", value_name = "KEY=VALUE")]
    extra_attr: Vec<String>,
    /// Parallel image downloads
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u64).range(1..=64))]
    max_workers: u64,
}

fn parse_delay(s: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|_| format!("not a number: {}", s))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("delay must be a non-negative number of seconds, got {}", s));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

/// `KEY=VALUE` pairs, split on the first `=`. Later keys replace earlier ones.
fn parse_extra_attrs(pairs: &[String]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((k, v)) if !k.is_empty() => {
                out.insert(k.to_string(), v.to_string());
            }
            _ => warn!("Ignoring --extra-attr without KEY=VALUE form: {:?}", pair),
        }
    }
    out
}

/// One ingestion run, independent of the concrete fetcher and table.
struct Job {
    url: String,
    pages: u32,
    delay: Duration,
    download_dir: PathBuf,
    extra: BTreeMap<String, String>,
    max_workers: usize,
}

struct RunSummary {
    unique: usize,
    images: ImageStats,
    upsert: UpsertSummary,
}

async fn ingest(
    job: &Job,
    fetcher: Arc<dyn Fetch>,
    store: &dyn ItemStore,
    settings: &Settings,
) -> Result<RunSummary> {
    let origin = url::Url::parse(&settings.site_origin)
        .with_context(|| format!("Invalid site origin {}", settings.site_origin))?;
    let extractor = Extractor::new(origin, settings.origin_tag.as_str());

    println!("Scraping: {} (pages={})", job.url, job.pages);
    let scraped =
        search::scrape_listings(fetcher.as_ref(), &extractor, &job.url, job.pages, job.delay)
            .await?;
    let mut records = scraped.records;
    println!(
        "Found {} unique products ({} listings on {} pages)",
        records.len(),
        scraped.found,
        scraped.pages
    );

    println!("Downloading images into: {}", job.download_dir.display());
    let image_stats = images::attach_images(
        &mut records,
        &job.download_dir,
        job.max_workers,
        settings.max_filename_len,
        fetcher,
    )
    .await?;
    println!(
        "Images: {} downloaded, {} already present, {} failed",
        image_stats.downloaded, image_stats.cached, image_stats.failed
    );

    println!(
        "Upserting {} products into DynamoDB table: {}",
        records.len(),
        store.table()
    );
    let updated_at = chrono::Utc::now().timestamp();
    let upserted = store::upsert(store, &records, &job.extra, settings, updated_at).await?;
    println!("Wrote {} items ({} failed).", upserted.written, upserted.failed);

    Ok(RunSummary {
        unique: records.len(),
        images: image_stats,
        upsert: upserted,
    })
}

async fn run(cli: Cli, settings: Settings) -> Result<()> {
    let job = Job {
        url: cli.url,
        pages: cli.pages,
        delay: cli.delay,
        download_dir: cli.download_dir,
        extra: parse_extra_attrs(&cli.extra_attr),
        max_workers: cli.max_workers as usize,
    };
    let fetcher: Arc<dyn Fetch> = Arc::new(HttpFetcher::new(&settings)?);
    let store =
        DynamoStore::connect(&cli.table_name, cli.aws_region, settings.unprocessed_retries).await;

    let summary = ingest(&job, fetcher, &store, &settings).await?;
    tracing::info!(
        unique = summary.unique,
        images_failed = summary.images.failed,
        written = summary.upsert.written,
        write_failed = summary.upsert.failed,
        "Run complete"
    );
    println!("Done.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = run(cli, settings).await;

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
