//! Record storage with idempotent upserts.
//!
//! Records are identified by `(source_url, title)`, never by position, so
//! running the same crawl twice leaves the same number of stored documents.
//!
//! # Implementations
//!
//! - [`JsonFileStore`]: a JSON document file written through on every upsert
//!   (temp file + rename), opened once at start-up and passed by reference
//! - [`MemoryStore`]: process-local storage for dry runs and tests
//!
//! ```text
//! data/
//! └── news.json   # [{ "title": ..., "source_url": ..., "created_at": ..., ... }]
//! ```

use crate::error::{NewsError, Result};
use crate::models::NewsRecord;
use crate::utils::eq_fold;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Outcome of a successful upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// A persisted record plus bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoredRecord {
    #[serde(flatten)]
    pub record: NewsRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Paging and filtering for [`NewsStore::list`].
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub category: Option<String>,
    pub limit: usize,
    pub skip: usize,
    /// Oldest first when true; newest first otherwise.
    pub ascending: bool,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            category: None,
            limit: 20,
            skip: 0,
            ascending: false,
        }
    }
}

/// One page of stored records and the total number of matches.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub records: Vec<StoredRecord>,
    pub total: usize,
    pub limit: usize,
    pub skip: usize,
}

/// Storage boundary of the pipeline.
pub trait NewsStore {
    /// Insert the record or update the one with the same `(source_url, title)`.
    async fn upsert(&self, record: &NewsRecord) -> Result<Upsert>;

    /// Remove every record, returning how many were removed.
    async fn clear(&self) -> Result<usize>;

    async fn count(&self) -> Result<usize>;

    async fn list(&self, query: &ListQuery) -> Result<Page>;
}

/// Reject records the document schema does not allow.
pub fn validate(record: &NewsRecord) -> Result<()> {
    let required = [
        ("title", &record.title),
        ("summary", &record.summary),
        ("body", &record.body),
        ("source_name", &record.source_name),
        ("source_url", &record.source_url),
        ("category", &record.category),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(NewsError::InvalidRecord(format!(
                "{field} must not be empty (source_url: {})",
                record.source_url
            )));
        }
    }
    Ok(())
}

/// Upsert into an in-memory document list.
fn apply_upsert(docs: &mut Vec<StoredRecord>, record: &NewsRecord, now: DateTime<Utc>) -> Upsert {
    let key = record.key();
    match docs.iter_mut().find(|doc| doc.record.key() == key) {
        Some(existing) => {
            existing.record = record.clone();
            existing.updated_at = now;
            Upsert::Updated
        }
        None => {
            docs.push(StoredRecord {
                record: record.clone(),
                created_at: now,
                updated_at: now,
            });
            Upsert::Inserted
        }
    }
}

fn page(docs: &[StoredRecord], query: &ListQuery) -> Page {
    let mut matching: Vec<&StoredRecord> = docs
        .iter()
        .filter(|doc| {
            query
                .category
                .as_ref()
                .is_none_or(|c| eq_fold(&doc.record.category, c))
        })
        .collect();
    matching.sort_by_key(|doc| doc.record.published_at);
    if !query.ascending {
        matching.reverse();
    }
    Page {
        total: matching.len(),
        records: matching
            .into_iter()
            .skip(query.skip)
            .take(query.limit)
            .cloned()
            .collect(),
        limit: query.limit,
        skip: query.skip,
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<Vec<StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record in insertion order.
    #[cfg(test)]
    pub async fn records(&self) -> Vec<NewsRecord> {
        self.docs
            .lock()
            .await
            .iter()
            .map(|doc| doc.record.clone())
            .collect()
    }
}

impl NewsStore for MemoryStore {
    async fn upsert(&self, record: &NewsRecord) -> Result<Upsert> {
        validate(record)?;
        Ok(apply_upsert(&mut *self.docs.lock().await, record, Utc::now()))
    }

    async fn clear(&self) -> Result<usize> {
        let mut docs = self.docs.lock().await;
        let removed = docs.len();
        docs.clear();
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.docs.lock().await.len())
    }

    async fn list(&self, query: &ListQuery) -> Result<Page> {
        Ok(page(&self.docs.lock().await, query))
    }
}

/// JSON document file store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    docs: Mutex<Vec<StoredRecord>>,
}

impl JsonFileStore {
    /// Open the store, creating an empty one if the file does not exist yet.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let docs = match fs::read_to_string(&path).await {
            Ok(json) if json.trim().is_empty() => Vec::new(),
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent).await?;
                }
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        info!(count = docs.len(), "Opened record store");
        Ok(Self {
            path,
            docs: Mutex::new(docs),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, docs: &[StoredRecord]) -> Result<()> {
        let json = serde_json::to_string_pretty(docs)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!(count = docs.len(), "Wrote record store");
        Ok(())
    }
}

impl NewsStore for JsonFileStore {
    #[instrument(level = "debug", skip_all, fields(source_url = %record.source_url))]
    async fn upsert(&self, record: &NewsRecord) -> Result<Upsert> {
        validate(record)?;
        let mut docs = self.docs.lock().await;
        let mut next = docs.clone();
        let outcome = apply_upsert(&mut next, record, Utc::now());
        self.write(&next).await?;
        *docs = next;
        Ok(outcome)
    }

    async fn clear(&self) -> Result<usize> {
        let mut docs = self.docs.lock().await;
        let removed = docs.len();
        self.write(&[]).await?;
        docs.clear();
        info!(removed, "Cleared record store");
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.docs.lock().await.len())
    }

    async fn list(&self, query: &ListQuery) -> Result<Page> {
        Ok(page(&self.docs.lock().await, query))
    }
}
