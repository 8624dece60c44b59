//! Error types shared across the crawler.
//!
//! Transport failures are deliberately absent: the fetcher reports them as
//! "no content" and they never travel further than that.

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, NewsError>;

#[derive(Debug, thiserror::Error)]
pub enum NewsError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}
