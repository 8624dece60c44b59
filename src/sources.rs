//! Source registry: which news sites to crawl and how to look at them.
//!
//! The registry is loaded once at process start, either from the built-in
//! `config/sources.yaml` or from a user-supplied YAML file, and is read-only
//! afterwards. Each source carries ordered selector candidates rather than a
//! single selector, because listing-page markup is not under our control.
//!
//! ```yaml
//! max_articles_per_source: 10
//! sources:
//!   - name: Example
//!     entry_url: https://example.com/latest/
//!     base_url: https://example.com
//!     selectors:
//!       articles: ["article", ".news-item"]
//!       title: ["h2"]
//! ```

use crate::error::{NewsError, Result};
use crate::utils::eq_fold;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, instrument, warn};
use url::Url;

const BUILTIN_REGISTRY: &str = include_str!("../config/sources.yaml");

fn default_max_articles() -> usize {
    10
}

/// Ordered selector candidates for each field of a listing entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SelectorSet {
    pub articles: Vec<String>,
    pub title: Vec<String>,
    pub summary: Vec<String>,
    pub link: Vec<String>,
    pub image: Vec<String>,
    pub category: Vec<String>,
}

/// One configured news site.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SourceConfig {
    pub name: String,
    /// Listing page fetched at the start of every crawl.
    pub entry_url: Url,
    /// Base for resolving relative links and image paths.
    pub base_url: Url,
    #[serde(default)]
    pub selectors: SelectorSet,
}

impl SourceConfig {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(NewsError::Config("source name must not be empty".into()));
        }
        for (field, url) in [("entry_url", &self.entry_url), ("base_url", &self.base_url)] {
            if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
                return Err(NewsError::Config(format!(
                    "{}: {} must be an absolute http(s) URL, got {}",
                    self.name, field, url
                )));
            }
        }
        if self.selectors.articles.is_empty() {
            warn!(
                source = %self.name,
                "No article selectors configured; relying on the generic pool"
            );
        }
        Ok(())
    }
}

/// All sources for a crawl plus the per-source output cap.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SourceRegistry {
    #[serde(default = "default_max_articles")]
    pub max_articles_per_source: usize,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    /// The registry compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_REGISTRY)
    }

    /// Parse and validate a registry document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let registry: SourceRegistry = serde_yaml::from_str(yaml)?;
        registry.validate()?;
        Ok(registry)
    }

    /// Load a registry file from disk.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = tokio::fs::read_to_string(path.as_ref()).await?;
        let registry = Self::from_yaml(&yaml)?;
        info!(count = registry.sources.len(), "Loaded source registry");
        Ok(registry)
    }

    /// Keep only the named sources, preserving registration order.
    ///
    /// An empty filter keeps everything. Unknown names are an error so a typo
    /// does not silently produce an empty crawl.
    pub fn only(mut self, names: &[String]) -> Result<Self> {
        if names.is_empty() {
            return Ok(self);
        }
        for name in names {
            if !self.sources.iter().any(|s| eq_fold(&s.name, name)) {
                return Err(NewsError::Config(format!("unknown source: {name}")));
            }
        }
        self.sources
            .retain(|s| names.iter().any(|n| eq_fold(&s.name, n)));
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.max_articles_per_source == 0 {
            return Err(NewsError::Config(
                "max_articles_per_source must be positive".into(),
            ));
        }
        let mut seen = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !seen.insert(source.name.to_lowercase()) {
                return Err(NewsError::Config(format!(
                    "duplicate source name: {}",
                    source.name
                )));
            }
        }
        Ok(())
    }
}
