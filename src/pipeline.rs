//! The on-demand crawl trigger.
//!
//! ```text
//! clear? -> crawl_all -> bodies? -> summaries? -> enrichment? -> mirroring? -> upsert
//! ```
//!
//! Every stage recovers its own failures; the run always ends in a
//! [`CrawlReport`] whose [`Outcome`] maps to the process exit code.

use crate::enrich::{AskAsync, Enricher};
use crate::mirror::ImageMirror;
use crate::models::{is_placeholder_image, NewsRecord};
use crate::scrapers::content::{fetch_body, is_placeholder_body, MISSING_BODY};
use crate::scrapers::crawl::crawl_all;
use crate::scrapers::fetch::Fetcher;
use crate::sources::SourceRegistry;
use crate::store::NewsStore;
use crate::summarize::{html_to_text, summarize_by_word_count};
use crate::utils::truncate_chars;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

pub const EMPTY_RESULT_MESSAGE: &str = "no records found, try again later";

const SUMMARY_WORDS: usize = 40;
const MAX_SUMMARY_CHARS: usize = 300;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    /// Storage unavailable, or every write failed.
    Failed,
    /// Some writes failed.
    Partial,
    /// Nothing was found to store.
    Empty,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::Failed => 1,
            Outcome::Partial => 2,
            Outcome::Empty => 3,
        }
    }
}

/// Structured result of one trigger run.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub success: bool,
    pub outcome: Outcome,
    pub message: String,
    pub total_found: usize,
    pub processed: usize,
    pub persisted: usize,
    pub failed: usize,
    pub cleared: usize,
    pub enriched: usize,
    /// Records in the store after the run, when it could be counted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_total: Option<usize>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<NewsRecord>>,
}

impl CrawlReport {
    /// Report for a run that could not reach its store.
    pub fn storage_unavailable(reason: &str) -> Self {
        Self {
            success: false,
            outcome: Outcome::Failed,
            message: format!("storage unavailable: {reason}"),
            total_found: 0,
            processed: 0,
            persisted: 0,
            failed: 0,
            cleared: 0,
            enriched: 0,
            stored_total: None,
            elapsed_ms: 0,
            records: None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }
}

/// Optional stages of a run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub clear: bool,
    pub fetch_bodies: bool,
    pub body_concurrency: usize,
    pub summarize: bool,
    /// Attach the stored records to the report.
    pub include_records: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            clear: false,
            fetch_bodies: false,
            body_concurrency: 4,
            summarize: false,
            include_records: false,
        }
    }
}

/// Everything a run needs, borrowed from the caller for its duration.
#[derive(Debug)]
pub struct Pipeline<'a, S, A> {
    pub fetcher: &'a Fetcher,
    pub registry: &'a SourceRegistry,
    pub store: &'a S,
    pub enricher: &'a Enricher<A>,
    pub mirror: Option<&'a ImageMirror>,
}

impl<'a, S, A> Pipeline<'a, S, A>
where
    S: NewsStore,
    A: AskAsync<Response = String>,
{
    #[instrument(level = "info", skip_all, fields(sources = self.registry.sources.len()))]
    pub async fn run(&self, options: &PipelineOptions) -> CrawlReport {
        let t0 = Instant::now();

        let mut cleared = 0;
        if options.clear {
            match self.store.clear().await {
                Ok(n) => cleared = n,
                Err(e) => {
                    error!(error = %e, "Cannot clear record store");
                    return CrawlReport::storage_unavailable(&e.to_string());
                }
            }
            if let Some(mirror) = self.mirror {
                if let Err(e) = mirror.clean().await {
                    warn!(error = %e, "Cannot clean mirrored images");
                }
            }
        }

        let mut records = crawl_all(self.fetcher, self.registry).await;
        let total_found = records.len();
        info!(total_found, "Crawl finished");

        if total_found == 0 {
            warn!("{EMPTY_RESULT_MESSAGE}");
            return CrawlReport {
                success: false,
                outcome: Outcome::Empty,
                message: EMPTY_RESULT_MESSAGE.to_string(),
                total_found,
                processed: 0,
                persisted: 0,
                failed: 0,
                cleared,
                enriched: 0,
                stored_total: self.store.count().await.ok(),
                elapsed_ms: t0.elapsed().as_millis() as u64,
                records: options.include_records.then(Vec::new),
            };
        }

        if options.fetch_bodies {
            records = fetch_bodies(self.fetcher, records, options.body_concurrency).await;
        }
        if options.summarize {
            summarize_from_bodies(&mut records);
        }
        let (mut records, enriched) = self.enricher.enrich_all(records).await;
        if let Some(mirror) = self.mirror {
            mirror_images(self.fetcher, mirror, &mut records).await;
        }
        for record in records.iter_mut().filter(|r| r.body.trim().is_empty()) {
            record.body = MISSING_BODY.to_string();
        }

        let processed = records.len();
        let mut persisted = 0;
        let mut failed = 0;
        for record in &records {
            match self.store.upsert(record).await {
                Ok(outcome) => {
                    persisted += 1;
                    debug!(?outcome, source_url = %record.source_url, "Stored record");
                }
                Err(e) => {
                    failed += 1;
                    warn!(
                        error = %e,
                        source_url = %record.source_url,
                        "Cannot store record; continuing"
                    );
                }
            }
        }

        let (outcome, message) = if failed == 0 {
            (Outcome::Success, format!("stored {persisted} of {total_found} records"))
        } else if persisted == 0 {
            (Outcome::Failed, format!("every write failed ({failed} records)"))
        } else {
            (
                Outcome::Partial,
                format!("stored {persisted} of {processed} records; {failed} failed"),
            )
        };
        let stored_total = match self.store.count().await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(error = %e, "Cannot count stored records");
                None
            }
        };
        let elapsed_ms = t0.elapsed().as_millis() as u64;
        info!(total_found, processed, persisted, failed, elapsed_ms, "Run finished");

        CrawlReport {
            success: outcome == Outcome::Success,
            outcome,
            message,
            total_found,
            processed,
            persisted,
            failed,
            cleared,
            enriched,
            stored_total,
            elapsed_ms,
            records: options.include_records.then_some(records),
        }
    }
}

/// Fetch article bodies with bounded concurrency, keeping record order.
#[instrument(level = "info", skip_all, fields(count = records.len(), concurrency = concurrency))]
async fn fetch_bodies(
    fetcher: &Fetcher,
    records: Vec<NewsRecord>,
    concurrency: usize,
) -> Vec<NewsRecord> {
    stream::iter(records)
        .map(|mut record| async move {
            record.body = fetch_body(fetcher, &record.source_url).await;
            record
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// Replace synthesized summaries with the opening sentences of the body.
fn summarize_from_bodies(records: &mut [NewsRecord]) {
    for record in records.iter_mut() {
        if !record.has_fallback_summary() || is_placeholder_body(&record.body) {
            continue;
        }
        let text = html_to_text(&record.body);
        let summary =
            truncate_chars(&summarize_by_word_count(&text, SUMMARY_WORDS), MAX_SUMMARY_CHARS);
        if !summary.is_empty() {
            record.summary = summary;
        }
    }
}

async fn mirror_images(fetcher: &Fetcher, mirror: &ImageMirror, records: &mut [NewsRecord]) {
    for record in records.iter_mut() {
        if is_placeholder_image(&record.image_url) {
            continue;
        }
        let local = mirror
            .mirror(fetcher, &record.image_url, &record.source_url, &record.title)
            .await;
        if let Some(local) = local {
            record.image_url = local;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::models::fallback_summary;
    use crate::sources::{SelectorSet, SourceConfig};
    use crate::store::{JsonFileStore, ListQuery, MemoryStore, Page, Upsert};
    use httpmock::prelude::*;
    use std::error::Error;
    use std::time::Duration;
    use url::Url;

    #[derive(Debug)]
    struct FailingAsk;

    impl AskAsync for FailingAsk {
        type Response = String;
        async fn ask(&self, _text: &str) -> std::result::Result<String, Box<dyn Error>> {
            Err("quota exceeded".into())
        }
    }

    /// Store that rejects every record whose title contains "reject".
    #[derive(Debug, Default)]
    struct PickyStore(MemoryStore);

    impl NewsStore for PickyStore {
        async fn upsert(&self, record: &NewsRecord) -> Result<Upsert> {
            if record.title.contains("reject") {
                return Err(crate::error::NewsError::InvalidRecord("rejected".into()));
            }
            self.0.upsert(record).await
        }
        async fn clear(&self) -> Result<usize> {
            self.0.clear().await
        }
        async fn count(&self) -> Result<usize> {
            self.0.count().await
        }
        async fn list(&self, query: &ListQuery) -> Result<Page> {
            self.0.list(query).await
        }
    }

    fn listing(titles: &[&str]) -> String {
        let articles: String = titles
            .iter()
            .enumerate()
            .map(|(n, title)| {
                format!(
                    r#"<article><h2>{title}</h2><a href="/x{n}">more</a><time datetime="2024-05-01T10:00:00Z"></time></article>"#
                )
            })
            .collect();
        format!("<html><body>{articles}</body></html>")
    }

    fn registry_for(server: &MockServer) -> SourceRegistry {
        let base = Url::parse(&server.base_url()).unwrap();
        SourceRegistry {
            max_articles_per_source: 10,
            sources: vec![SourceConfig {
                name: "Mock".into(),
                entry_url: base.join("/news").unwrap(),
                base_url: base,
                selectors: SelectorSet {
                    articles: vec![".does-not-match".into()],
                    ..SelectorSet::default()
                },
            }],
        }
    }

    fn fetcher() -> Fetcher {
        Fetcher::new(Duration::from_secs(5)).unwrap()
    }

    fn no_enrichment() -> Enricher<FailingAsk> {
        Enricher::new(None, Duration::ZERO)
    }

    #[tokio::test]
    async fn five_articles_are_persisted() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/news");
            then.status(200).body(listing(&["A", "B", "C", "D", "E"]));
        });
        let fetcher = fetcher();
        let registry = registry_for(&server);
        let store = MemoryStore::new();
        let enricher = no_enrichment();
        let pipeline = Pipeline {
            fetcher: &fetcher,
            registry: &registry,
            store: &store,
            enricher: &enricher,
            mirror: None,
        };

        let report = pipeline.run(&PipelineOptions::default()).await;

        assert!(report.success);
        assert_eq!(report.exit_code(), 0);
        assert_eq!((report.total_found, report.processed, report.persisted), (5, 5, 5));
        let stored = store.records().await;
        assert_eq!(stored.len(), 5);
        assert!(stored.iter().all(|r| r.body == MISSING_BODY));
        assert_eq!(stored[0].source_url, format!("{}/x0", server.base_url()));
    }

    #[tokio::test]
    async fn unreachable_sources_give_empty_result() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/news");
            then.status(503);
        });
        let fetcher = fetcher();
        let registry = registry_for(&server);
        let store = MemoryStore::new();
        let enricher = no_enrichment();
        let pipeline = Pipeline {
            fetcher: &fetcher,
            registry: &registry,
            store: &store,
            enricher: &enricher,
            mirror: None,
        };

        let report = pipeline.run(&PipelineOptions::default()).await;

        assert!(!report.success);
        assert_eq!(report.outcome, Outcome::Empty);
        assert_eq!(report.exit_code(), 3);
        assert_eq!(report.message, EMPTY_RESULT_MESSAGE);
        assert_eq!((report.total_found, report.persisted), (0, 0));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn repeated_runs_do_not_duplicate() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/news");
            then.status(200).body(listing(&["A", "B", "C"]));
        });
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("news.json");
        let fetcher = fetcher();
        let registry = registry_for(&server);
        let enricher = no_enrichment();

        for _ in 0..2 {
            let store = JsonFileStore::open(&path).await.unwrap();
            let pipeline = Pipeline {
                fetcher: &fetcher,
                registry: &registry,
                store: &store,
                enricher: &enricher,
                mirror: None,
            };
            assert!(pipeline.run(&PipelineOptions::default()).await.success);
        }

        let store = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn failed_enrichment_stores_record_unchanged() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/news");
            then.status(200).body(listing(&["Only story"]));
        });
        let fetcher = fetcher();
        let registry = registry_for(&server);

        let plain_store = MemoryStore::new();
        let plain = no_enrichment();
        Pipeline {
            fetcher: &fetcher,
            registry: &registry,
            store: &plain_store,
            enricher: &plain,
            mirror: None,
        }
        .run(&PipelineOptions::default())
        .await;

        let enriched_store = MemoryStore::new();
        let failing = Enricher::new(Some(FailingAsk), Duration::ZERO);
        let report = Pipeline {
            fetcher: &fetcher,
            registry: &registry,
            store: &enriched_store,
            enricher: &failing,
            mirror: None,
        }
        .run(&PipelineOptions::default())
        .await;

        assert_eq!(report.enriched, 0);
        assert_eq!(enriched_store.records().await, plain_store.records().await);
    }

    #[tokio::test]
    async fn some_failed_writes_are_partial() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/news");
            then.status(200).body(listing(&["keep", "reject me", "keep too"]));
        });
        let fetcher = fetcher();
        let registry = registry_for(&server);
        let store = PickyStore::default();
        let enricher = no_enrichment();
        let pipeline = Pipeline {
            fetcher: &fetcher,
            registry: &registry,
            store: &store,
            enricher: &enricher,
            mirror: None,
        };

        let report = pipeline.run(&PipelineOptions::default()).await;

        assert_eq!(report.outcome, Outcome::Partial);
        assert_eq!(report.exit_code(), 2);
        assert_eq!((report.persisted, report.failed), (2, 1));
    }

    #[tokio::test]
    async fn bodies_and_summaries_are_filled() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/news");
            then.status(200).body(listing(&["Story"]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/x0");
            then.status(200).body(
                r#"<html><body><div class="news-content"><p>The council approved the new budget on Monday. Work starts next year.</p></div></body></html>"#,
            );
        });
        let fetcher = fetcher();
        let registry = registry_for(&server);
        let store = MemoryStore::new();
        let enricher = no_enrichment();
        let pipeline = Pipeline {
            fetcher: &fetcher,
            registry: &registry,
            store: &store,
            enricher: &enricher,
            mirror: None,
        };
        let options = PipelineOptions {
            fetch_bodies: true,
            summarize: true,
            include_records: true,
            ..PipelineOptions::default()
        };

        let report = pipeline.run(&options).await;

        let records = report.records.unwrap();
        assert!(records[0].body.contains("council approved"));
        assert_ne!(records[0].summary, fallback_summary("Story"));
        assert!(records[0].summary.starts_with("The council approved the new budget on Monday."));
    }

    #[tokio::test]
    async fn clear_reports_removed_count() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/news");
            then.status(200).body(listing(&["A"]));
        });
        let fetcher = fetcher();
        let registry = registry_for(&server);
        let store = MemoryStore::new();
        let enricher = no_enrichment();
        let pipeline = Pipeline {
            fetcher: &fetcher,
            registry: &registry,
            store: &store,
            enricher: &enricher,
            mirror: None,
        };
        pipeline.run(&PipelineOptions::default()).await;

        let report = pipeline
            .run(&PipelineOptions {
                clear: true,
                ..PipelineOptions::default()
            })
            .await;

        assert_eq!(report.cleared, 1);
        assert_eq!(report.stored_total, Some(1));
    }
}
