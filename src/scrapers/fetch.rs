//! Page fetching with browser-like headers.
//!
//! The fetcher is the transport boundary of the crawl: every failure mode
//! (DNS, TLS, timeout, non-2xx status, undecodable body) is logged here and
//! reported as `None`. Callers treat `None` as "zero content from this URL".
//! There are no retries; a source that blocks us is left alone for this run.

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Default per-request budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Raw HTML of one page together with the URL it came from.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub url: String,
    pub html: String,
}

/// HTTP client shared by every crawl task. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("tr,en-US;q=0.7,en;q=0.3"),
    );
    headers.insert(header::REFERER, HeaderValue::from_static("https://www.google.com/"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers
}

impl Fetcher {
    /// Build a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(browser_headers())
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Fetch a page as text. `None` on any transport or status failure.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch(&self, url: &str) -> Option<RawDocument> {
        let t0 = Instant::now();
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, timeout = e.is_timeout(), "Request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Non-success status; treating as empty");
            return None;
        }
        let final_url = response.url().to_string();

        match response.text().await {
            Ok(html) => {
                debug!(
                    bytes = html.len(),
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "Fetched page"
                );
                Some(RawDocument {
                    url: final_url,
                    html,
                })
            }
            Err(e) => {
                warn!(error = %e, "Failed to read response body");
                None
            }
        }
    }

    /// Fetch raw bytes (images). Same failure contract as [`Fetcher::fetch`].
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Option<Vec<u8>> {
        let response = match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), "Non-success status");
            return None;
        }
        match response.bytes().await {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(e) => {
                warn!(error = %e, "Failed to read response body");
                None
            }
        }
    }
}
