//! Data models for crawled news records.
//!
//! - [`NewsRecord`]: the canonical, storage-ready representation of one item
//! - [`RecordBuilder`]: accumulates optional fields during extraction and only
//!   yields a record once the mandatory title and link are present
//! - [`RecordKey`]: the `(source_url, title)` identity used for upserts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category used when a listing entry carries none.
pub const DEFAULT_CATEGORY: &str = "General";

const PLACEHOLDER_IMAGE_PREFIX: &str = "https://picsum.photos/id/";

/// A normalized news item.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NewsRecord {
    pub title: String,
    pub source_name: String,
    /// Absolute article URL. Together with `title` this is the record identity.
    pub source_url: String,
    /// Absolute image URL, a mirrored local reference, or a placeholder.
    pub image_url: String,
    pub summary: String,
    pub category: String,
    /// HTML fragment; empty until the content fetcher fills it.
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub published_at: DateTime<Utc>,
}

/// Deduplication identity of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub source_url: String,
    pub title: String,
}

impl NewsRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            source_url: self.source_url.clone(),
            title: self.title.clone(),
        }
    }

    /// True when the summary is still the sentence synthesized from the title.
    pub fn has_fallback_summary(&self) -> bool {
        self.summary == fallback_summary(&self.title)
    }
}

/// Call-to-action sentence used when a listing entry has no summary text.
pub fn fallback_summary(title: &str) -> String {
    format!("{title}: click through to read the full story.")
}

/// Stable 32-bit fold of a link, identical across runs and platforms.
pub fn link_hash(link: &str) -> u32 {
    link.bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32))
}

/// Stable placeholder image for a record without one.
///
/// The picture id is derived from the link so the same article always gets
/// the same placeholder across runs.
pub fn placeholder_image(link: &str) -> String {
    let id = link_hash(link) % 100 + 1;
    format!("{PLACEHOLDER_IMAGE_PREFIX}{id}/600/400")
}

pub fn is_placeholder_image(url: &str) -> bool {
    url.starts_with(PLACEHOLDER_IMAGE_PREFIX)
}

/// Accumulates the partially-known fields of one listing entry.
#[derive(Debug, Default, Clone)]
pub struct RecordBuilder {
    title: Option<String>,
    link: Option<String>,
    summary: Option<String>,
    image: Option<String>,
    category: Option<String>,
    published_at: Option<DateTime<Utc>>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: Option<String>) -> Self {
        self.title = non_empty(title);
        self
    }

    pub fn link(mut self, link: Option<String>) -> Self {
        self.link = non_empty(link);
        self
    }

    pub fn summary(mut self, summary: Option<String>) -> Self {
        self.summary = non_empty(summary);
        self
    }

    pub fn image(mut self, image: Option<String>) -> Self {
        self.image = non_empty(image);
        self
    }

    pub fn category(mut self, category: Option<String>) -> Self {
        self.category = non_empty(category);
        self
    }

    pub fn published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }

    /// Produce the canonical record, or `None` if title or link is missing.
    ///
    /// `crawled_at` is the publication time when the source exposed none.
    pub fn build(self, source_name: &str, crawled_at: DateTime<Utc>) -> Option<NewsRecord> {
        let title = self.title?;
        let link = self.link?;
        let category = self.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
        Some(NewsRecord {
            summary: self.summary.unwrap_or_else(|| fallback_summary(&title)),
            image_url: self.image.unwrap_or_else(|| placeholder_image(&link)),
            tags: vec![category.to_lowercase()],
            category,
            body: String::new(),
            source_name: source_name.to_string(),
            published_at: self.published_at.unwrap_or(crawled_at),
            source_url: link,
            title,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_title_and_link() {
        let now = Utc::now();
        assert!(RecordBuilder::new()
            .title(Some("Headline".into()))
            .build("Src", now)
            .is_none());
        assert!(RecordBuilder::new()
            .link(Some("https://example.com/a".into()))
            .build("Src", now)
            .is_none());
        assert!(RecordBuilder::new()
            .title(Some("   ".into()))
            .link(Some("https://example.com/a".into()))
            .build("Src", now)
            .is_none());
    }

    #[test]
    fn builder_fills_defaults() {
        let now = Utc::now();
        let record = RecordBuilder::new()
            .title(Some(" Headline ".into()))
            .link(Some("https://example.com/a".into()))
            .build("Src", now)
            .unwrap();

        assert_eq!(record.title, "Headline");
        assert_eq!(record.source_name, "Src");
        assert_eq!(record.category, DEFAULT_CATEGORY);
        assert_eq!(record.tags, vec!["general".to_string()]);
        assert!(record.has_fallback_summary());
        assert!(is_placeholder_image(&record.image_url));
        assert!(record.body.is_empty());
        assert_eq!(record.published_at, now);
    }

    #[test]
    fn builder_keeps_discovered_fields() {
        let record = RecordBuilder::new()
            .title(Some("Headline".into()))
            .link(Some("https://example.com/a".into()))
            .summary(Some("Short spot".into()))
            .image(Some("https://example.com/a.jpg".into()))
            .category(Some("Economy".into()))
            .build("Src", Utc::now())
            .unwrap();

        assert_eq!(record.summary, "Short spot");
        assert_eq!(record.image_url, "https://example.com/a.jpg");
        assert_eq!(record.category, "Economy");
        assert_eq!(record.tags, vec!["economy".to_string()]);
        assert!(!record.has_fallback_summary());
    }

    #[test]
    fn placeholder_is_stable_and_in_range() {
        let a = placeholder_image("https://example.com/x1");
        assert_eq!(a, placeholder_image("https://example.com/x1"));
        let id: u32 = a
            .trim_start_matches(PLACEHOLDER_IMAGE_PREFIX)
            .split('/')
            .next()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=100).contains(&id));
    }

    #[test]
    fn key_is_link_and_title() {
        let record = RecordBuilder::new()
            .title(Some("T".into()))
            .link(Some("https://example.com/t".into()))
            .build("Src", Utc::now())
            .unwrap();
        assert_eq!(
            record.key(),
            RecordKey {
                source_url: "https://example.com/t".into(),
                title: "T".into()
            }
        );
    }

    #[test]
    fn record_round_trips_through_json() {
        let record = RecordBuilder::new()
            .title(Some("T".into()))
            .link(Some("https://example.com/t".into()))
            .build("Src", Utc::now())
            .unwrap();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"source_url\":\"https://example.com/t\""));
        let back: NewsRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
