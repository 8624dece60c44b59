//! Crawl orchestration across all configured sources.
//!
//! Every source runs as its own tokio task. A task that fails, panics or
//! finds nothing contributes an empty list; siblings and the caller are never
//! affected. Results are concatenated in registration order.

use crate::models::NewsRecord;
use crate::scrapers::extract::parse_listing;
use crate::scrapers::fetch::Fetcher;
use crate::sources::{SourceConfig, SourceRegistry};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Crawl one source's listing page.
#[instrument(level = "info", skip_all, fields(source = %source.name, url = %source.entry_url))]
pub async fn crawl_source(
    fetcher: &Fetcher,
    source: &SourceConfig,
    limit: usize,
    crawled_at: DateTime<Utc>,
) -> Vec<NewsRecord> {
    let t0 = Instant::now();
    let Some(doc) = fetcher.fetch(source.entry_url.as_str()).await else {
        warn!("Listing page unavailable; source contributes nothing this run");
        return Vec::new();
    };
    if doc.url != source.entry_url.as_str() {
        debug!(final_url = %doc.url, "Listing page was redirected");
    }
    let records = parse_listing(&doc.html, source, limit, crawled_at);
    info!(
        count = records.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Crawled source"
    );
    records
}

/// Crawl every source concurrently and concatenate the results.
#[instrument(level = "info", skip_all, fields(sources = registry.sources.len()))]
pub async fn crawl_all(fetcher: &Fetcher, registry: &SourceRegistry) -> Vec<NewsRecord> {
    let crawled_at = Utc::now();
    let limit = registry.max_articles_per_source;

    let handles: Vec<_> = registry
        .sources
        .iter()
        .map(|source| {
            let fetcher = fetcher.clone();
            let source = source.clone();
            tokio::spawn(async move { crawl_source(&fetcher, &source, limit, crawled_at).await })
        })
        .collect();
    let results = join_all(handles).await;

    let mut records = Vec::new();
    for (source, result) in registry.sources.iter().zip(results) {
        match result {
            Ok(found) => records.extend(found),
            Err(e) => error!(source = %source.name, error = %e, "Crawl task failed"),
        }
    }
    info!(count = records.len(), "Crawled all sources");
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SelectorSet;
    use httpmock::prelude::*;
    use std::time::Duration;
    use url::Url;

    fn source(name: &str, server: &MockServer, path: &str) -> SourceConfig {
        SourceConfig {
            name: name.into(),
            entry_url: Url::parse(&server.url(path)).unwrap(),
            base_url: Url::parse(&server.base_url()).unwrap(),
            selectors: SelectorSet {
                articles: vec![".story".into()],
                ..Default::default()
            },
        }
    }

    fn listing(prefix: &str, n: usize) -> String {
        (1..=n)
            .map(|i| {
                format!(r#"<div class="story"><h2>{prefix} {i}</h2><a href="/{prefix}/{i}">x</a></div>"#)
            })
            .collect()
    }

    #[tokio::test]
    async fn failing_source_does_not_affect_siblings() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/a");
            then.status(200).body(listing("a", 2));
        });
        server.mock(|when, then| {
            when.method(GET).path("/down");
            then.status(503);
        });
        server.mock(|when, then| {
            when.method(GET).path("/c");
            then.status(200).body(listing("c", 3));
        });

        let registry = SourceRegistry {
            max_articles_per_source: 10,
            sources: vec![
                source("A", &server, "/a"),
                source("Down", &server, "/down"),
                source("C", &server, "/c"),
            ],
        };
        let fetcher = Fetcher::new(Duration::from_secs(5)).unwrap();
        let records = crawl_all(&fetcher, &registry).await;

        let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["a 1", "a 2", "c 1", "c 2", "c 3"]);
        assert!(records.iter().all(|r| r.source_name != "Down"));
    }

    #[tokio::test]
    async fn per_source_cap_applies() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/many");
            then.status(200).body(listing("m", 30));
        });
        let registry = SourceRegistry {
            max_articles_per_source: 10,
            sources: vec![source("Many", &server, "/many")],
        };
        let fetcher = Fetcher::new(Duration::from_secs(5)).unwrap();
        assert_eq!(crawl_all(&fetcher, &registry).await.len(), 10);
    }

    #[tokio::test]
    async fn no_sources_is_empty() {
        let registry = SourceRegistry {
            max_articles_per_source: 10,
            sources: vec![],
        };
        let fetcher = Fetcher::new(Duration::from_secs(5)).unwrap();
        assert!(crawl_all(&fetcher, &registry).await.is_empty());
    }
}
