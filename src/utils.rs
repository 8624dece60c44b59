//! Utility functions for URL normalization, text cleanup, logging, and file system checks.
//!
//! - URL resolution for links and images scraped from listing pages
//! - Whitespace normalization and char-safe truncation of scraped text
//! - String truncation and slugification for logs and file names
//! - JSON error detection for handling truncated model replies
//! - File system validation for output directories

use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Resolve a scraped `href`/`src` value to an absolute URL.
///
/// - `https://…` / `http://…` are kept as they are
/// - `//host/path` gets an `https:` scheme
/// - `/path` is joined onto `base`
/// - `host.tld/path` (first segment contains a dot) is assumed `https`
/// - any other relative path is joined onto `base`
///
/// Values that cannot point at an article or image (`javascript:`,
/// `mailto:`, `tel:`, `data:`, bare fragments) resolve to `None`, as does
/// anything that ends up outside `http`/`https` (`whatsapp://`, `ftp://`).
///
/// # Examples
///
/// ```ignore
/// let base = Url::parse("https://example.com").unwrap();
/// assert_eq!(resolve_url("/haber/123", &base).unwrap(), "https://example.com/haber/123");
/// assert_eq!(resolve_url("example.com/x", &base).unwrap(), "https://example.com/x");
/// ```
pub fn resolve_url(raw: &str, base: &Url) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }
    let lower = raw.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let resolved = if lower.starts_with("http://") || lower.starts_with("https://") {
        Url::parse(raw).ok()?
    } else if raw.starts_with("//") {
        Url::parse(&format!("https:{raw}")).ok()?
    } else if raw.starts_with('/') {
        base.join(raw).ok()?
    } else if looks_like_host(raw) {
        Url::parse(&format!("https://{raw}")).ok()?
    } else {
        base.join(raw).ok()?
    };
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

fn looks_like_host(raw: &str) -> bool {
    const FILE_SUFFIXES: &[&str] = &[
        ".html", ".htm", ".php", ".asp", ".aspx", ".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg",
    ];
    let first = raw.split(['/', '?', '#']).next().unwrap_or_default();
    let lower = first.to_ascii_lowercase();
    first.contains('.')
        && !first.starts_with('.')
        && !FILE_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
        && first.chars().all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | ':'))
}

/// Case-insensitive comparison that also folds non-ASCII letters (`Ö`, `Ü`).
pub fn eq_fold(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Collapse all whitespace runs into single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep at most `max` characters, never splitting a UTF-8 sequence.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].trim_end().to_string(),
        None => s.to_string(),
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and byte count
/// indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…(+{} bytes)", &s[..idx], s.len() - idx),
        None => s.to_string(),
    }
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// A model reply cut off by its token limit fails with an EOF error.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Convert a title to a file-name friendly slug.
///
/// Lowercases the text, drops everything but alphanumerics, spaces and
/// hyphens, and replaces spaces with hyphens.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify_title("Hello World"), "hello-world");
/// assert_eq!(slugify_title("Test-Article!"), "test-article");
/// ```
pub fn slugify_title(title: &str) -> String {
    title
        .to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ' && c != '-', "")
        .replace(' ', "-")
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and removes a probe file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable
/// (permission denied, read-only filesystem, etc.).
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    fs::create_dir_all(path).await?;
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com").unwrap()
    }

    #[test]
    fn test_resolve_root_relative() {
        assert_eq!(
            resolve_url("/haber/123", &base()).unwrap(),
            "https://example.com/haber/123"
        );
    }

    #[test]
    fn test_resolve_rejects_non_web_schemes() {
        assert_eq!(resolve_url("whatsapp://send?text=haber", &base()), None);
        assert_eq!(resolve_url("ftp://files.example.com/a.pdf", &base()), None);
        assert_eq!(resolve_url("intent:share", &base()), None);
        assert_eq!(
            resolve_url("haber/123", &base()).as_deref(),
            Some("https://example.com/haber/123")
        );
    }

    #[test]
    fn test_eq_fold_handles_turkish_letters() {
        assert!(eq_fold("SÖZCÜ", "Sözcü"));
        assert!(eq_fold("GÜNDEM", "gündem"));
        assert!(!eq_fold("Spor", "Gündem"));
    }

    #[test]
    fn test_resolve_protocol_less_host() {
        assert_eq!(
            resolve_url("example.com/x", &base()).unwrap(),
            "https://example.com/x"
        );
        assert_eq!(
            resolve_url("www.other.org", &base()).unwrap(),
            "https://www.other.org/"
        );
    }

    #[test]
    fn test_resolve_scheme_relative() {
        assert_eq!(
            resolve_url("//cdn.example.com/a.jpg", &base()).unwrap(),
            "https://cdn.example.com/a.jpg"
        );
    }

    #[test]
    fn test_resolve_absolute_kept() {
        assert_eq!(
            resolve_url("http://news.example.org/a?b=1", &base()).unwrap(),
            "http://news.example.org/a?b=1"
        );
    }

    #[test]
    fn test_resolve_plain_relative_path() {
        let base = Url::parse("https://example.com/section/").unwrap();
        assert_eq!(
            resolve_url("story-1.html", &base).unwrap(),
            "https://example.com/section/story-1.html"
        );
        assert_eq!(
            resolve_url("images/a.jpg", &base).unwrap(),
            "https://example.com/section/images/a.jpg"
        );
        assert_eq!(
            resolve_url("a.jpg", &base).unwrap(),
            "https://example.com/section/a.jpg"
        );
    }

    #[test]
    fn test_resolve_rejects_non_links() {
        let unusable = [
            "",
            "  ",
            "#top",
            "javascript:void(0)",
            "mailto:a@b.c",
            "tel:123",
            "data:image/gif;base64,R0",
        ];
        for raw in unusable {
            assert_eq!(resolve_url(raw, &base()), None, "{raw}");
        }
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\t b  c "), "a b c");
    }

    #[test]
    fn test_truncate_chars_respects_utf8() {
        assert_eq!(truncate_chars("çğıöşü", 3), "çğı");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn test_truncate_for_log_short_reply() {
        let reply = r#"{"title": "ok"}"#;
        assert_eq!(truncate_for_log(reply, 100), reply);
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_slugify_title() {
        assert_eq!(slugify_title("Big News Today"), "big-news-today");
        assert_eq!(
            slugify_title("Seçim sonuçları açıklandı!"),
            "seçim-sonuçları-açıklandı"
        );
        assert_eq!(slugify_title("Breaking: 3% rise?"), "breaking-3-rise");
    }

    #[test]
    fn test_looks_truncated() {
        let json_eof = r#"{"field": "value"#;
        let result: Result<serde_json::Value, _> = serde_json::from_str(json_eof);
        assert!(looks_truncated(&result.unwrap_err()));
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a/b");
        let path = nested.to_str().unwrap().to_string();
        ensure_writable_dir(&path).await.unwrap();
        assert!(nested.is_dir());
    }
}
