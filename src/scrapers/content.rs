//! Article body retrieval.
//!
//! Known content containers are tried in order; the first one present yields
//! its inner markup. Pages matching none of them fall back to their longer
//! paragraphs. A body is always returned: when nothing usable exists the
//! reader gets a fragment pointing back to the original source.

use crate::scrapers::fetch::Fetcher;
use crate::utils::normalize_whitespace;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};

/// Paragraphs at or below this many characters are treated as captions,
/// bylines and ad labels.
pub const MIN_PARAGRAPH_CHARS: usize = 30;

/// Body used when the article page cannot be fetched.
pub const UNREACHABLE_BODY: &str =
    "<p>The article could not be loaded. Please read it at the original source.</p>";

/// Body used when the page holds no recognisable article text.
pub const MISSING_BODY: &str =
    "<p>The article text could not be extracted. Please visit the original source.</p>";

/// Content containers, most specific first.
pub const CONTENT_SELECTORS: &[&str] = &[
    ".news-content",
    ".article-content",
    ".content-text",
    "#article-body",
    "article .content",
    ".detail-content",
    ".news-detail",
    ".article-body",
    ".news-text",
    ".entry-content",
    ".news-detail__content",
    ".article__content",
    ".content-body",
    ".story-body",
    ".article-text",
    ".post-content",
    ".article-desc",
    "#main-article",
    ".main-content",
    ".story-content",
    ".content-article",
    "article",
    ".detail",
    ".article",
    ".content",
];

/// Extract the body fragment of an article page.
///
/// Returns `None` when neither a container nor a long-enough paragraph exists.
pub fn extract_body(html: &str, min_paragraph_chars: usize) -> Option<String> {
    let document = Html::parse_document(html);

    for raw in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let inner = element.inner_html();
            if !inner.trim().is_empty() {
                debug!(selector = raw, bytes = inner.len(), "Found content container");
                return Some(inner.trim().to_string());
            }
        }
    }

    let paragraph = Selector::parse("p").ok()?;
    let body: String = document
        .select(&paragraph)
        .filter(|p| {
            normalize_whitespace(&p.text().collect::<String>())
                .chars()
                .count()
                > min_paragraph_chars
        })
        .map(|p| p.html())
        .collect();

    if body.is_empty() {
        None
    } else {
        debug!(bytes = body.len(), "Built body from paragraphs");
        Some(body)
    }
}

/// Fetch an article page and return its body fragment or a placeholder.
#[instrument(level = "info", skip(fetcher))]
pub async fn fetch_body(fetcher: &Fetcher, url: &str) -> String {
    let Some(doc) = fetcher.fetch(url).await else {
        warn!("Article page unavailable");
        return UNREACHABLE_BODY.to_string();
    };
    match extract_body(&doc.html, MIN_PARAGRAPH_CHARS) {
        Some(body) => {
            info!(bytes = body.len(), "Extracted article body");
            body
        }
        None => {
            warn!("No article text found");
            MISSING_BODY.to_string()
        }
    }
}

/// True for the fragments this module substitutes for real article text.
pub fn is_placeholder_body(body: &str) -> bool {
    body == UNREACHABLE_BODY || body == MISSING_BODY
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Duration;

    #[test]
    fn first_matching_container_wins() {
        let html = r#"<html><body>
            <div class="content">generic wrapper</div>
            <div class="article-body"><p>Body text</p></div>
        </body></html>"#;
        assert_eq!(extract_body(html, MIN_PARAGRAPH_CHARS).unwrap(), "<p>Body text</p>");
    }

    #[test]
    fn empty_container_falls_through() {
        let html = r#"<div class="news-content">  </div><div class="entry-content"><p>Real</p></div>"#;
        assert_eq!(extract_body(html, MIN_PARAGRAPH_CHARS).unwrap(), "<p>Real</p>");
    }

    #[test]
    fn paragraphs_are_filtered_by_length_in_order() {
        let long_a = "A long paragraph that easily passes the noise threshold.";
        let long_b = "Another long paragraph with plenty of meaningful text in it.";
        let html = format!(
            "<div><p>{long_a}</p><p>Photo: AP</p><p>{long_b}</p></div>"
        );
        let body = extract_body(&html, MIN_PARAGRAPH_CHARS).unwrap();
        assert_eq!(body, format!("<p>{long_a}</p><p>{long_b}</p>"));
    }

    #[test]
    fn nothing_usable_is_none() {
        assert!(extract_body("<div><p>short</p></div>", MIN_PARAGRAPH_CHARS).is_none());
        assert!(extract_body("", MIN_PARAGRAPH_CHARS).is_none());
    }

    #[tokio::test]
    async fn fetch_body_uses_placeholders() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/ok");
            then.status(200)
                .body(r#"<html><body><div class="story-body"><p>Hello</p></div></body></html>"#);
        });
        server.mock(|when, then| {
            when.method(GET).path("/empty");
            then.status(200).body("<html><body><p>tiny</p></body></html>");
        });
        server.mock(|when, then| {
            when.method(GET).path("/gone");
            then.status(404);
        });

        let fetcher = Fetcher::new(Duration::from_secs(5)).unwrap();
        assert_eq!(fetch_body(&fetcher, &server.url("/ok")).await, "<p>Hello</p>");
        assert_eq!(fetch_body(&fetcher, &server.url("/empty")).await, MISSING_BODY);
        assert_eq!(fetch_body(&fetcher, &server.url("/gone")).await, UNREACHABLE_BODY);
        assert!(is_placeholder_body(MISSING_BODY));
    }
}
