//! Content-extraction collaborator.
//!
//! Workers treat extraction as a black box: given a URL and a time budget it
//! yields `{title, excerpt, content}` or an error. [`HttpExtractor`] is the
//! production implementation (reqwest fetch + [`readability::extract`]);
//! tests substitute their own [`Extractor`].

pub mod readability;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::ExtractionError;

pub use readability::extract;

/// Readable content extracted from a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub title: String,
    pub excerpt: String,
    /// Cleaned HTML of the main content.
    pub content: String,
}

/// Anything that can turn a URL into readable content.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, url: &str, timeout: Duration) -> Result<Extracted, ExtractionError>;
}

/// Browser-like user agent; many sites reject obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Fetches pages over HTTP and runs readability extraction on them.
pub struct HttpExtractor {
    client: Client,
}

impl HttpExtractor {
    pub fn new() -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }

    /// Parses `raw` and accepts only http(s) URLs.
    pub fn parse_url(raw: &str) -> Result<Url, ExtractionError> {
        let url = Url::parse(raw.trim()).map_err(|_| ExtractionError::InvalidUrl(raw.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            _ => Err(ExtractionError::InvalidUrl(raw.to_string())),
        }
    }

    async fn fetch_html(&self, url: &Url, timeout: Duration) -> Result<String, ExtractionError> {
        let response = self
            .client
            .get(url.as_str())
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(&self, url: &str, timeout: Duration) -> Result<Extracted, ExtractionError> {
        let url = Self::parse_url(url)?;
        let html = self.fetch_html(&url, timeout).await?;
        debug!(url = %url, bytes = html.len(), "Fetched page");

        // Parsing is CPU-bound; keep it off the async workers
        tokio::task::spawn_blocking(move || extract(&html, &url))
            .await
            .map_err(|e| ExtractionError::Failed(format!("extraction task failed: {}", e)))?
    }
}
