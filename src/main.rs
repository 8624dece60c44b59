//! # News Crawler
//!
//! Crawls news listing pages whose markup is not under our control, extracts
//! canonical article records, and upserts them into a local document store.
//!
//! ## Features
//!
//! - Per-source selector candidates ranked against the live page, with a
//!   generic selector pool when a site's markup changes
//! - Field extraction through ordered fallback strategies, placeholder images
//!   and synthesized summaries so partial listings still yield records
//! - Optional article body fetch, body-based summaries, LLM enrichment through
//!   an OpenAI-compatible API, and local image mirroring
//! - Idempotent upserts keyed on `(source_url, title)`
//!
//! ## Usage
//!
//! ```sh
//! news_crawler crawl --fetch-bodies
//! news_crawler list --limit 5
//! ```
//!
//! The crawl report is printed to stdout as JSON; logs go to stderr. The exit
//! code is `0` on success, `1` when storage failed, `2` when some writes
//! failed and `3` when no records were found.

use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod enrich;
mod error;
mod mirror;
mod models;
mod pipeline;
mod scrapers;
mod sources;
mod store;
mod summarize;
mod utils;

use cli::{Cli, Command, CrawlArgs, ListArgs};
use enrich::{load_model, AskFnWrapper, Enricher, RetryAsk};
use mirror::ImageMirror;
use pipeline::{CrawlReport, Pipeline, PipelineOptions};
use scrapers::fetch::Fetcher;
use sources::SourceRegistry;
use store::{JsonFileStore, ListQuery, MemoryStore, NewsStore};
use utils::ensure_writable_dir;

const ENRICH_MAX_RETRIES: usize = 2;
const ENRICH_BASE_DELAY: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    debug!(store = %args.store, "Parsed CLI arguments");

    match args.command {
        Command::Crawl(crawl) => {
            let report = run_crawl(&args.store, &crawl).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            std::process::exit(report.exit_code());
        }
        Command::List(list) => {
            run_list(&args.store, &list).await?;
        }
    }
    Ok(())
}

#[instrument(level = "info", skip_all, fields(store = %store_path, dry_run = args.dry_run))]
async fn run_crawl(store_path: &str, args: &CrawlArgs) -> Result<CrawlReport, Box<dyn Error>> {
    let start_time = std::time::Instant::now();
    info!("news_crawler starting up");

    // ---- Source registry ----
    let registry = match &args.sources {
        Some(path) => SourceRegistry::from_path(path).await?,
        None => SourceRegistry::builtin()?,
    };
    let registry = if args.only.is_empty() {
        registry
    } else {
        registry.only(&args.only)?
    };
    info!(
        sources = registry.sources.len(),
        cap = registry.max_articles_per_source,
        "Loaded source registry"
    );

    let fetcher = Fetcher::new(Duration::from_secs(args.timeout_secs))?;

    // ---- Enrichment (best effort) ----
    let model = if args.enrich {
        load_model(args.config.as_deref(), &args.template).await
    } else {
        None
    };
    let asker = model.as_ref().map(|(config, template)| {
        RetryAsk::new(AskFnWrapper { config, template }, ENRICH_MAX_RETRIES, ENRICH_BASE_DELAY)
    });
    let enricher = Enricher::new(asker, Duration::from_millis(args.enrich_delay_ms));

    // ---- Image mirroring (best effort) ----
    let mirror = match &args.mirror_dir {
        Some(dir) => match ensure_writable_dir(dir).await {
            Ok(()) => {
                let mirror = ImageMirror::new(dir, &args.mirror_prefix);
                info!(dir = %mirror.dir().display(), "Mirroring images locally");
                Some(mirror)
            }
            Err(e) => {
                warn!(
                    path = %dir,
                    error = %e,
                    "Mirror directory is not writable; keeping remote images"
                );
                None
            }
        },
        None => None,
    };

    let options = PipelineOptions {
        clear: args.clear,
        fetch_bodies: args.fetch_bodies,
        body_concurrency: args.body_concurrency,
        summarize: args.summarize,
        include_records: args.dry_run,
    };

    let report = if args.dry_run {
        let store = MemoryStore::new();
        Pipeline {
            fetcher: &fetcher,
            registry: &registry,
            store: &store,
            enricher: &enricher,
            mirror: mirror.as_ref(),
        }
        .run(&options)
        .await
    } else {
        match open_store(store_path).await {
            Ok(store) => {
                info!(path = %store.path().display(), "Using record store");
                Pipeline {
                    fetcher: &fetcher,
                    registry: &registry,
                    store: &store,
                    enricher: &enricher,
                    mirror: mirror.as_ref(),
                }
                .run(&options)
                .await
            }
            Err(e) => {
                error!(path = %store_path, error = %e, "Record store is unavailable");
                CrawlReport::storage_unavailable(&e.to_string())
            }
        }
    };

    let elapsed = start_time.elapsed();
    info!(
        outcome = ?report.outcome,
        persisted = report.persisted,
        elapsed_secs = elapsed.as_secs_f64(),
        "news_crawler finished"
    );
    Ok(report)
}

async fn open_store(path: &str) -> Result<JsonFileStore, Box<dyn Error + Send + Sync>> {
    let parent = Path::new(path)
        .parent()
        .and_then(|p| p.to_str())
        .filter(|p| !p.is_empty())
        .unwrap_or(".");
    ensure_writable_dir(parent).await?;
    Ok(JsonFileStore::open(path).await?)
}

#[instrument(level = "info", skip_all, fields(store = %store_path))]
async fn run_list(store_path: &str, args: &ListArgs) -> Result<(), Box<dyn Error>> {
    let store = JsonFileStore::open(store_path).await?;
    let query = ListQuery {
        category: args.category.clone(),
        limit: args.limit,
        skip: args.skip,
        ascending: args.ascending,
    };
    let page = store.list(&query).await?;
    info!(total = page.total, returned = page.records.len(), "Listed records");
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}
