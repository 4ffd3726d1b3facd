//! Paginated feed source
//!
//! `GET <feed-url>` answers `{"data": [record, ...], "paging": {"next": url}}`.
//! The first URL is built from the configured base URL plus the caller's
//! access token; every later URL is whatever `paging.next` advertised.

use async_trait::async_trait;
use fr_common::config::FeedConfig;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Feed fetch errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Feed API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Feed fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),
}

/// One page of the feed
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FeedPage {
    /// Feed records; absent or null reads as empty
    #[serde(default)]
    pub data: Option<Vec<Value>>,

    #[serde(default)]
    pub paging: Option<Paging>,
}

/// Pagination links
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Paging {
    #[serde(default)]
    pub next: Option<String>,
}

impl FeedPage {
    pub fn new(records: Vec<Value>, next: Option<String>) -> Self {
        Self {
            data: Some(records),
            paging: Some(Paging { next }),
        }
    }

    pub fn records(&self) -> &[Value] {
        self.data.as_deref().unwrap_or(&[])
    }

    /// Continuation link, if the page advertises a non-empty one
    pub fn next_url(&self) -> Option<&str> {
        self.paging
            .as_ref()
            .and_then(|paging| paging.next.as_deref())
            .filter(|next| !next.is_empty())
    }
}

/// Source of feed pages
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// First-page URL for a caller's access credential
    fn seed_url(&self, credential: &str) -> Result<String, FetchError>;

    /// Fetch and parse one page
    async fn fetch_page(&self, url: &str) -> Result<FeedPage, FetchError>;
}

/// Append `access_token` and `limit` to `base_url`
pub fn build_seed_url(base_url: &str, credential: &str, page_size: u32) -> Result<String, FetchError> {
    let mut url = Url::parse(base_url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("access_token", credential)
        .append_pair("limit", &page_size.to_string());
    Ok(url.to_string())
}

/// URL without its query string, safe to log (feed URLs carry the access token)
pub fn redact_url(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// Feed client over HTTP
pub struct HttpFeedSource {
    http_client: reqwest::Client,
    base_url: String,
    page_size: u32,
    timeout: Duration,
}

impl HttpFeedSource {
    pub fn new(config: &FeedConfig) -> Result<Self, FetchError> {
        Url::parse(&config.base_url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.fetch_timeout())
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.clone(),
            page_size: config.page_size,
            timeout: config.fetch_timeout(),
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    fn seed_url(&self, credential: &str) -> Result<String, FetchError> {
        build_seed_url(&self.base_url, credential, self.page_size)
    }

    async fn fetch_page(&self, url: &str) -> Result<FeedPage, FetchError> {
        tracing::debug!(url = %redact_url(url), "Fetching feed page");

        let response = self.http_client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Network(e.without_url().to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(FetchError::Api(status.as_u16(), error_text));
        }

        response
            .json::<FeedPage>()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(self.timeout)
                } else {
                    FetchError::Parse(e.without_url().to_string())
                }
            })
    }
}
