//! Empirical choice of the article-container selector.
//!
//! Listing markup changes without notice, so no single selector is trusted.
//! Every candidate (the source's own plus a generic pool) is evaluated against
//! the live document and the one with the most matches wins.

use crate::sources::SourceConfig;
use itertools::Itertools;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

/// Selectors that tend to match article containers on arbitrary news sites.
pub const GENERIC_ARTICLE_SELECTORS: &[&str] = &[
    "article",
    "[data-article-id]",
    "[data-news-id]",
    "[data-id]",
    ".news-item",
    ".card",
    "[class*=\"news\"]",
    "[class*=\"card\"]",
    "[class*=\"item\"]",
];

/// The winning selector and how many elements it matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranked {
    pub selector: String,
    pub count: usize,
}

/// Count the matches of every selector and keep the strictly best one.
///
/// Ties keep the earliest candidate. Unparseable selectors are skipped.
/// Returns `None` when no candidate matches anything.
pub fn rank<'a>(
    document: &Html,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<Ranked> {
    let mut best: Option<Ranked> = None;
    for candidate in candidates {
        let Ok(selector) = Selector::parse(candidate) else {
            debug!(selector = candidate, "Skipping unparseable selector");
            continue;
        };
        let count = document.select(&selector).count();
        debug!(selector = candidate, count, "Evaluated selector");
        if count > best.as_ref().map_or(0, |b| b.count) {
            best = Some(Ranked {
                selector: candidate.to_string(),
                count,
            });
        }
    }
    best
}

/// The candidate list for a source: its own selectors first, then the
/// generic pool, without duplicates.
pub fn candidates_for(source: &SourceConfig) -> Vec<&str> {
    source
        .selectors
        .articles
        .iter()
        .map(String::as_str)
        .chain(GENERIC_ARTICLE_SELECTORS.iter().copied())
        .unique()
        .collect()
}

/// Select the article candidates of a listing document.
///
/// The source's own selectors lead the candidate list, so a nominal selector
/// that matches anything is already considered by the ranking. An empty
/// result means the source contributes no records.
pub fn select_articles<'a>(document: &'a Html, source: &SourceConfig) -> Vec<ElementRef<'a>> {
    let Some(winner) = rank(document, candidates_for(source)) else {
        debug!(source = %source.name, "No candidate selector matched");
        return Vec::new();
    };
    let Ok(selector) = Selector::parse(&winner.selector) else {
        return Vec::new();
    };
    let elements: Vec<_> = document.select(&selector).collect();
    info!(
        source = %source.name,
        selector = %winner.selector,
        count = elements.len(),
        "Selected article candidates"
    );
    elements
}
