//! Listing-page extraction.
//!
//! Each article candidate is turned into a [`NewsRecord`] by running one
//! ordered strategy chain per field. A strategy is a plain function from the
//! candidate to an optional value; the first `Some` wins. Title and link are
//! mandatory, every other field has a default supplied by [`RecordBuilder`].

use crate::models::{NewsRecord, RecordBuilder};
use crate::scrapers::ranker;
use crate::sources::SourceConfig;
use crate::utils::{normalize_whitespace, resolve_url, truncate_chars};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

/// Longest title taken from a candidate's own text.
const MAX_FALLBACK_TITLE_CHARS: usize = 100;

static BACKGROUND_IMAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)background-image:\s*url\(\s*['"]?([^'"()]+)['"]?\s*\)"#).expect("valid regex")
});

/// One matched element plus what is needed to interpret it.
pub struct Candidate<'a> {
    pub element: ElementRef<'a>,
    pub source: &'a SourceConfig,
}

impl Candidate<'_> {
    fn base(&self) -> &Url {
        &self.source.base_url
    }
}

/// A single extraction step. Pure: reads the candidate, never mutates.
pub type Strategy<T> = fn(&Candidate<'_>) -> Option<T>;

/// Evaluate strategies in order; first success wins.
pub fn first_success<T>(strategies: &[Strategy<T>], candidate: &Candidate<'_>) -> Option<T> {
    strategies.iter().find_map(|strategy| strategy(candidate))
}

const TITLE_STRATEGIES: &[Strategy<String>] = &[
    title_from_source_selectors,
    title_from_headings,
    title_from_emphasis,
    title_from_own_text,
];

const LINK_STRATEGIES: &[Strategy<String>] = &[
    link_from_first_anchor,
    link_from_source_selectors,
    link_from_any_anchor,
];

const SUMMARY_STRATEGIES: &[Strategy<String>] = &[
    summary_from_source_selectors,
    summary_from_paragraph,
    summary_from_class_hints,
];

const IMAGE_STRATEGIES: &[Strategy<String>] = &[
    image_from_source_selectors,
    image_from_img_tag,
    image_from_background_style,
];

const CATEGORY_STRATEGIES: &[Strategy<String>] = &[
    category_from_source_selectors,
    category_from_class_hints,
];

const PUBLISHED_STRATEGIES: &[Strategy<DateTime<Utc>>] = &[published_from_time_tag];

// --- selection helpers ---

fn parse_selector(raw: &str) -> Option<Selector> {
    match Selector::parse(raw) {
        Ok(selector) => Some(selector),
        Err(e) => {
            debug!(selector = raw, error = %e, "Skipping unparseable selector");
            None
        }
    }
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = normalize_whitespace(&element.text().collect::<String>());
    (!text.is_empty()).then_some(text)
}

/// Text of the first descendant matching any of `selectors`, in order.
fn first_text<S: AsRef<str>>(element: ElementRef<'_>, selectors: &[S]) -> Option<String> {
    selectors.iter().find_map(|raw| {
        let selector = parse_selector(raw.as_ref())?;
        element.select(&selector).find_map(element_text)
    })
}

fn usable_href(element: ElementRef<'_>, base: &Url) -> Option<String> {
    element
        .value()
        .attr("href")
        .and_then(|href| resolve_url(href, base))
}

// --- title ---

fn title_from_source_selectors(c: &Candidate<'_>) -> Option<String> {
    first_text(c.element, &c.source.selectors.title)
}

fn title_from_headings(c: &Candidate<'_>) -> Option<String> {
    first_text(c.element, &["h1", "h2", "h3", "h4"])
}

fn title_from_emphasis(c: &Candidate<'_>) -> Option<String> {
    first_text(c.element, &["strong", "b", "em"])
}

fn title_from_own_text(c: &Candidate<'_>) -> Option<String> {
    element_text(c.element).map(|text| truncate_chars(&text, MAX_FALLBACK_TITLE_CHARS))
}

// --- link ---

fn link_from_first_anchor(c: &Candidate<'_>) -> Option<String> {
    if c.element.value().name() == "a" {
        if let Some(link) = usable_href(c.element, c.base()) {
            return Some(link);
        }
    }
    let selector = parse_selector("a")?;
    let anchor = c.element.select(&selector).next()?;
    usable_href(anchor, c.base())
}

fn link_from_source_selectors(c: &Candidate<'_>) -> Option<String> {
    c.source.selectors.link.iter().find_map(|raw| {
        let selector = parse_selector(raw)?;
        c.element
            .select(&selector)
            .next()
            .and_then(|el| usable_href(el, c.base()))
    })
}

fn link_from_any_anchor(c: &Candidate<'_>) -> Option<String> {
    let selector = parse_selector("[href]")?;
    c.element
        .select(&selector)
        .find_map(|el| usable_href(el, c.base()))
}

// --- summary ---

fn summary_from_source_selectors(c: &Candidate<'_>) -> Option<String> {
    first_text(c.element, &c.source.selectors.summary)
}

fn summary_from_paragraph(c: &Candidate<'_>) -> Option<String> {
    first_text(c.element, &["p"])
}

fn summary_from_class_hints(c: &Candidate<'_>) -> Option<String> {
    first_text(
        c.element,
        &[
            "[class*=\"summary\"]",
            "[class*=\"desc\"]",
            "[class*=\"spot\"]",
            "[class*=\"text\"]",
        ],
    )
}

// --- image ---

fn image_src(element: ElementRef<'_>, base: &Url) -> Option<String> {
    ["src", "data-src", "data-original", "data-lazy-src"]
        .iter()
        .filter_map(|attr| element.value().attr(attr))
        .find_map(|value| resolve_url(value, base))
}

fn image_from_source_selectors(c: &Candidate<'_>) -> Option<String> {
    c.source.selectors.image.iter().find_map(|raw| {
        let selector = parse_selector(raw)?;
        c.element
            .select(&selector)
            .find_map(|el| image_src(el, c.base()))
    })
}

fn image_from_img_tag(c: &Candidate<'_>) -> Option<String> {
    let selector = parse_selector("img")?;
    c.element
        .select(&selector)
        .find_map(|el| image_src(el, c.base()))
}

fn background_image(element: ElementRef<'_>, base: &Url) -> Option<String> {
    let style = element.value().attr("style")?;
    let url = BACKGROUND_IMAGE_RE.captures(style)?.get(1)?.as_str();
    resolve_url(url, base)
}

fn image_from_background_style(c: &Candidate<'_>) -> Option<String> {
    if let Some(url) = background_image(c.element, c.base()) {
        return Some(url);
    }
    let selector = parse_selector("[style*=\"background-image\"]")?;
    c.element
        .select(&selector)
        .find_map(|el| background_image(el, c.base()))
}

// --- category ---

fn category_from_source_selectors(c: &Candidate<'_>) -> Option<String> {
    first_text(c.element, &c.source.selectors.category)
}

fn category_from_class_hints(c: &Candidate<'_>) -> Option<String> {
    first_text(c.element, &["[class*=\"category\"]", "[class*=\"tag\"]"])
}

// --- publication time ---

fn published_from_time_tag(c: &Candidate<'_>) -> Option<DateTime<Utc>> {
    let selector = parse_selector("time[datetime]")?;
    c.element.select(&selector).find_map(|el| {
        let raw = el.value().attr("datetime")?;
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Run every field strategy chain against one candidate.
///
/// Returns `None` when the title or the link cannot be recovered.
pub fn extract_record(candidate: &Candidate<'_>, crawled_at: DateTime<Utc>) -> Option<NewsRecord> {
    let title = first_success(TITLE_STRATEGIES, candidate);
    if title.is_none() {
        debug!(source = %candidate.source.name, "No title; skipping element");
        return None;
    }
    let link = first_success(LINK_STRATEGIES, candidate);
    if link.is_none() {
        debug!(source = %candidate.source.name, ?title, "No link; skipping element");
        return None;
    }

    RecordBuilder::new()
        .title(title)
        .link(link)
        .summary(first_success(SUMMARY_STRATEGIES, candidate))
        .image(first_success(IMAGE_STRATEGIES, candidate))
        .category(first_success(CATEGORY_STRATEGIES, candidate))
        .published_at(first_success(PUBLISHED_STRATEGIES, candidate))
        .build(&candidate.source.name, crawled_at)
}

/// Extract up to `limit` records from matched elements, in document order.
///
/// A wrapper matched together with its children yields the same
/// `(source_url, title)` twice; only the first one is kept.
pub fn extract(
    elements: &[ElementRef<'_>],
    source: &SourceConfig,
    limit: usize,
    crawled_at: DateTime<Utc>,
) -> Vec<NewsRecord> {
    elements
        .iter()
        .filter_map(|&element| extract_record(&Candidate { element, source }, crawled_at))
        .unique_by(NewsRecord::key)
        .take(limit)
        .collect()
}

/// Parse a listing page and extract its records.
///
/// Malformed or empty HTML yields an empty list.
#[instrument(level = "info", skip_all, fields(source = %source.name))]
pub fn parse_listing(
    html: &str,
    source: &SourceConfig,
    limit: usize,
    crawled_at: DateTime<Utc>,
) -> Vec<NewsRecord> {
    if html.trim().is_empty() {
        info!("Empty listing page");
        return Vec::new();
    }
    let document = Html::parse_document(html);
    let elements = ranker::select_articles(&document, source);
    let records = extract(&elements, source, limit, crawled_at);
    info!(candidates = elements.len(), count = records.len(), "Extracted records");
    records
}
