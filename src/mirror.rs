//! Local copies of record images.
//!
//! Mirroring is best-effort: any failure leaves the remote URL in place.

use crate::models::link_hash;
use crate::scrapers::fetch::Fetcher;
use crate::utils::{slugify_title, truncate_chars};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument, warn};
use url::Url;

const IMAGE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_EXTENSION: &str = "jpg";

/// Downloads images into `dir` and hands out `public_prefix/<file>` references.
#[derive(Debug, Clone)]
pub struct ImageMirror {
    dir: PathBuf,
    public_prefix: String,
}

impl ImageMirror {
    pub fn new(dir: impl Into<PathBuf>, public_prefix: &str) -> Self {
        Self {
            dir: dir.into(),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Download the image of the record `(source_url, title)` and return its
    /// local reference.
    ///
    /// The file is named `<title-slug>-<link-hash>.<ext>`, so records sharing
    /// a headline never overwrite each other's image.
    #[instrument(level = "info", skip(self, fetcher))]
    pub async fn mirror(
        &self,
        fetcher: &Fetcher,
        image_url: &str,
        source_url: &str,
        title: &str,
    ) -> Option<String> {
        let file_name = format!("{}.{}", file_stem(source_url, title), extension(image_url));
        let bytes = fetcher.fetch_bytes(image_url, IMAGE_TIMEOUT).await?;

        if let Err(e) = fs::create_dir_all(&self.dir).await {
            warn!(error = %e, dir = %self.dir.display(), "Cannot create mirror directory");
            return None;
        }
        let path = self.dir.join(&file_name);
        if let Err(e) = fs::write(&path, &bytes).await {
            warn!(error = %e, path = %path.display(), "Cannot write mirrored image");
            return None;
        }
        info!(path = %path.display(), bytes = bytes.len(), "Mirrored image");
        Some(format!("{}/{}", self.public_prefix, file_name))
    }

    /// Delete every mirrored file, returning how many were removed.
    #[instrument(level = "info", skip(self), fields(dir = %self.dir.display()))]
    pub async fn clean(&self) -> std::io::Result<usize> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                match fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => {
                        warn!(error = %e, path = %entry.path().display(), "Cannot remove file");
                    }
                }
            }
        }
        info!(removed, "Cleaned mirror directory");
        Ok(removed)
    }
}

fn file_stem(source_url: &str, title: &str) -> String {
    let slug = truncate_chars(&slugify_title(title), 80);
    let slug = if slug.is_empty() { "image".to_string() } else { slug };
    format!("{slug}-{:08x}", link_hash(source_url))
}

/// Extension of the URL path, lowercased; `jpg` when absent or implausible.
fn extension(image_url: &str) -> String {
    Url::parse(image_url)
        .ok()
        .and_then(|url| {
            Path::new(url.path())
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_ascii_lowercase())
        })
        .filter(|ext| {
            (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}
