//! Plain-text helpers for building summaries from article bodies.

use once_cell::sync::Lazy;
use regex::Regex;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static SENTENCE_END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]\s+").expect("valid regex"));

const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&rsquo;", "'"),
    ("&lsquo;", "'"),
    ("&rdquo;", "\""),
    ("&ldquo;", "\""),
    ("&mdash;", "—"),
    ("&ndash;", "–"),
    ("&amp;", "&"),
];

/// Strip markup, decode common entities and collapse whitespace.
pub fn html_to_text(html: &str) -> String {
    let mut text = TAG_RE.replace_all(html, " ").into_owned();
    for (entity, replacement) in ENTITIES {
        text = text.replace(entity, replacement);
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text after `.`, `!` or `?` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END_RE.find_iter(text) {
        // keep the punctuation, drop the whitespace
        let end = m.start() + 1;
        sentences.push(text[start..end].trim());
        start = m.end();
    }
    sentences.push(text[start..].trim());
    sentences.retain(|s| !s.is_empty());
    sentences
}

/// Take whole sentences until at least `max_words` words are collected.
pub fn summarize_by_word_count(text: &str, max_words: usize) -> String {
    let mut words = 0;
    let mut summary = Vec::new();
    for sentence in split_sentences(text) {
        words += sentence.split_whitespace().count();
        summary.push(sentence);
        if words >= max_words {
            break;
        }
    }
    summary.join(" ")
}
