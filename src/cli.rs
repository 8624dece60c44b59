//! Command-line interface definitions.
//!
//! Every option can also come from the environment where noted.

use clap::{Args, Parser, Subcommand};

/// Crawl news listing pages and keep the extracted records in a local store.
///
/// # Examples
///
/// ```sh
/// # Crawl every built-in source into ./data/news.json
/// news_crawler crawl
///
/// # Crawl one source, fetch bodies, print records without storing them
/// news_crawler crawl --only Sözcü --fetch-bodies --dry-run
///
/// # Show the ten newest stored records in one category
/// news_crawler list --category Gündem --limit 10
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path of the JSON record store
    #[arg(long, global = true, env = "NEWS_STORE", default_value = "./data/news.json")]
    pub store: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one crawl and print the report as JSON
    Crawl(CrawlArgs),
    /// Print stored records as JSON
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// YAML source registry (defaults to the built-in one)
    #[arg(long, env = "NEWS_SOURCES")]
    pub sources: Option<String>,

    /// Crawl only the named source; repeat for several
    #[arg(long = "only")]
    pub only: Vec<String>,

    /// Remove stored records (and mirrored images) before crawling
    #[arg(long)]
    pub clear: bool,

    /// Fetch every article page for its body
    #[arg(long)]
    pub fetch_bodies: bool,

    /// Article pages fetched at once
    #[arg(long, default_value_t = 4)]
    pub body_concurrency: usize,

    /// Build summaries from fetched bodies where the listing had none
    #[arg(long)]
    pub summarize: bool,

    /// Rewrite records through the configured LLM
    #[arg(long)]
    pub enrich: bool,

    /// Optional path to the LLM config.yaml file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Chat template used for enrichment
    #[arg(long, default_value = "news_enricher")]
    pub template: String,

    /// Pause between enrichment calls, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub enrich_delay_ms: u64,

    /// HTTP timeout per request, in seconds
    #[arg(long, default_value_t = 15)]
    pub timeout_secs: u64,

    /// Directory for local image copies (mirroring is off when unset)
    #[arg(long, env = "NEWS_MIRROR_DIR")]
    pub mirror_dir: Option<String>,

    /// Public path prefix for mirrored images
    #[arg(long, default_value = "/uploads")]
    pub mirror_prefix: String,

    /// Use an in-memory store and include the records in the report
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only records in this category (case-insensitive)
    #[arg(long)]
    pub category: Option<String>,

    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    #[arg(long, default_value_t = 0)]
    pub skip: usize,

    /// Oldest first instead of newest first
    #[arg(long)]
    pub ascending: bool,
}
