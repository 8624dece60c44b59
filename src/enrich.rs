//! Best-effort record enrichment through an OpenAI-compatible LLM.
//!
//! A record's title, summary, body and tags may be rewritten by the model.
//! Enrichment never blocks or corrupts the base pipeline: a missing model
//! configuration, a failed call or an unparseable reply all return the
//! original record untouched.
//!
//! # Architecture
//!
//! - [`AskAsync`]: core trait defining async LLM interaction
//! - [`AskFnWrapper`]: wraps the `awful_aj` library's `ask` function
//! - [`RetryAsk`]: decorator that adds bounded retries to any `AskAsync`
//! - [`Enricher`]: builds the prompt, merges the reply, and paces calls
//!
//! # Pacing
//!
//! [`Enricher::enrich_all`] is a single worker: records are sent one at a
//! time with a fixed delay between calls so the model provider's rate limits
//! are respected.

use crate::models::NewsRecord;
use crate::utils::{looks_truncated, truncate_chars, truncate_for_log};
use awful_aj::api::ask;
use awful_aj::{config, config::AwfulJadeConfig, config_dir, template, template::ChatTemplate};
use itertools::Itertools;
use once_cell::sync::Lazy;
use rand::{rng, Rng};
use regex::Regex;
use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Longest body excerpt sent to the model.
const MAX_PROMPT_BODY_CHARS: usize = 6000;

static CODE_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("valid regex"));

/// Trait for async LLM interaction.
///
/// This abstraction allows for different LLM backends or decorators (like retry logic).
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send text to the LLM and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryAsk<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Wrap `inner`, retrying a failed call up to `max_retries` times.
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync + fmt::Debug,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.ask(text).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self
                        .base_delay
                        .saturating_mul(1 << (attempt - 1).min(16))
                        .min(self.max_delay);
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Wrapper around `awful_aj::api::ask` that implements [`AskAsync`].
#[derive(Debug)]
pub struct AskFnWrapper<'a> {
    /// LLM configuration (API key, endpoint, model settings).
    pub config: &'a AwfulJadeConfig,
    /// Chat template defining the conversation structure.
    pub template: &'a ChatTemplate,
}

impl<'a> AskAsync for AskFnWrapper<'a> {
    type Response = String;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = ask(self.config, text.to_string(), self.template, None, None).await;
        if let Err(e) = &res {
            warn!(elapsed_ms = t0.elapsed().as_millis() as u64, error = %e, "API call failed");
        }
        res
    }
}

/// Load the model configuration and chat template.
///
/// `None` (with a warning) when either is unavailable; enrichment is then
/// skipped and records are stored as crawled.
#[instrument(level = "info")]
pub async fn load_model(
    config_path: Option<&str>,
    template_name: &str,
) -> Option<(AwfulJadeConfig, ChatTemplate)> {
    let path = match config_path {
        Some(path) => PathBuf::from(path),
        None => match config_dir() {
            Ok(dir) => dir.join("config.yaml"),
            Err(e) => {
                warn!(error = %e, "No config directory; enrichment disabled");
                return None;
            }
        },
    };
    let Some(path) = path.to_str() else {
        warn!("Config path is not valid UTF-8; enrichment disabled");
        return None;
    };
    let config = match config::load_config(path) {
        Ok(config) => config,
        Err(e) => {
            warn!(config_path = path, error = %e, "Cannot load model config; enrichment disabled");
            return None;
        }
    };
    let template = match template::load_template(template_name).await {
        Ok(template) => template,
        Err(e) => {
            warn!(
                template = template_name,
                error = %e,
                "Cannot load template; enrichment disabled"
            );
            return None;
        }
    };
    info!(config_path = path, template = template_name, "Loaded model configuration");
    Some((config, template))
}

/// Fields the model may return. Missing or blank fields keep their originals.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EnrichedFields {
    title: Option<String>,
    summary: Option<String>,
    body: Option<String>,
    tags: Option<Vec<String>>,
    source_url: Option<String>,
}

fn build_prompt(record: &NewsRecord) -> String {
    let body = if record.body.trim().is_empty() {
        "(no body)".to_string()
    } else {
        truncate_chars(&record.body, MAX_PROMPT_BODY_CHARS)
    };
    format!(
        "Read the news item below and rewrite it to be more engaging and informative.\n\n\
         Original title: {title}\n\
         Original summary: {summary}\n\
         Original body: {body}\n\
         Source: {source}\n\
         Link: {link}\n\
         Category: {category}\n\n\
         Tasks:\n\
         1. Write a sharper, informative title (at most 100 characters).\n\
         2. Write a short summary capturing the essence (at most 200 characters).\n\
         3. Rewrite the story in full as HTML, at least three <p> paragraphs.\n\
         4. Suggest 3-5 relevant tags.\n\
         5. Only if the link above is not the article's canonical address, give the\n   \
         canonical absolute URL as source_url; otherwise leave source_url out.\n\n\
         Reply with exactly this JSON and nothing else:\n\
         {{\"title\": \"...\", \"summary\": \"...\", \"body\": \"<p>...</p>\", \
         \"tags\": [\"...\"], \"source_url\": null}}",
        title = record.title,
        summary = record.summary,
        body = body,
        source = record.source_name,
        link = record.source_url,
        category = record.category,
    )
}

/// Pull the JSON object out of a reply that may be wrapped in code fences or prose.
fn extract_json(reply: &str) -> &str {
    let inner = CODE_FENCE_RE
        .captures(reply)
        .and_then(|c| c.get(1))
        .map_or(reply, |m| m.as_str());
    match (inner.find('{'), inner.rfind('}')) {
        (Some(start), Some(end)) if start < end => &inner[start..=end],
        _ => inner.trim(),
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn merge(mut record: NewsRecord, fields: EnrichedFields) -> NewsRecord {
    if let Some(title) = blank_to_none(fields.title) {
        record.title = title;
    }
    if let Some(summary) = blank_to_none(fields.summary) {
        record.summary = summary;
    }
    if let Some(body) = blank_to_none(fields.body) {
        record.body = body;
    }
    if let Some(tags) = fields.tags {
        let tags: Vec<String> = tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unique()
            .collect();
        if !tags.is_empty() {
            record.tags = tags;
        }
    }
    if let Some(source_url) = blank_to_none(fields.source_url) {
        match Url::parse(&source_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                record.source_url = url.to_string();
            }
            _ => debug!(%source_url, "Ignoring unusable source_url from model"),
        }
    }
    record
}

/// Rewrites records through a model, one at a time.
#[derive(Debug)]
pub struct Enricher<A> {
    asker: Option<A>,
    delay: StdDuration,
}

impl<A> Enricher<A>
where
    A: AskAsync<Response = String>,
{
    /// `asker = None` builds a pass-through enricher.
    pub fn new(asker: Option<A>, delay: StdDuration) -> Self {
        Self { asker, delay }
    }

    pub fn is_enabled(&self) -> bool {
        self.asker.is_some()
    }

    /// Enrich one record; on any failure the input is returned unchanged.
    #[instrument(level = "info", skip_all, fields(source_url = %record.source_url))]
    pub async fn enrich(&self, record: NewsRecord) -> NewsRecord {
        let Some(asker) = &self.asker else {
            return record;
        };

        let reply = match asker.ask(&build_prompt(&record)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Enrichment call failed; keeping original record");
                return record;
            }
        };

        match serde_json::from_str::<EnrichedFields>(extract_json(&reply)) {
            Ok(fields) => {
                debug!("Enrichment reply parsed");
                merge(record, fields)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    truncated = looks_truncated(&e),
                    response_preview = %truncate_for_log(&reply, 300),
                    "Model returned non-conforming JSON; keeping original record"
                );
                record
            }
        }
    }

    /// Enrich records sequentially with `delay` between calls.
    ///
    /// Returns the records in input order and how many were changed.
    #[instrument(level = "info", skip_all, fields(count = records.len()))]
    pub async fn enrich_all(&self, records: Vec<NewsRecord>) -> (Vec<NewsRecord>, usize) {
        if !self.is_enabled() {
            return (records, 0);
        }
        let total = records.len();
        let mut out = Vec::with_capacity(total);
        let mut changed = 0;
        for (i, record) in records.into_iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            let original = record.clone();
            let enriched = self.enrich(record).await;
            if enriched != original {
                changed += 1;
            }
            debug!(index = i, total, "Enriched record");
            out.push(enriched);
        }
        info!(total, changed, "Enrichment finished");
        (out, changed)
    }
}
