//! Shared test fixtures: a scripted feed and cache doubles

#![allow(dead_code)]

use async_trait::async_trait;
use fr_common::cache::{CacheBackend, CacheError, CacheSelector, FailOpenCache, MemoryCache, ResultCache};
use fr_rank::feed::{FeedPage, FeedSource, FetchError};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Feed that serves pages `page:0`, `page:1`, ... from a fixed script
pub struct ScriptedFeed {
    pages: Vec<Result<FeedPage, FetchError>>,
    endless: bool,
    delay: Duration,
    calls: AtomicU32,
}

impl ScriptedFeed {
    /// Pages linked in order; the last one has no continuation
    pub fn chain(pages: Vec<Vec<Value>>) -> Self {
        let last = pages.len().saturating_sub(1);
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(i, records)| {
                let next = (i < last).then(|| format!("page:{}", i + 1));
                Ok(FeedPage::new(records, next))
            })
            .collect();
        Self {
            pages,
            endless: false,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    /// Every page has one record from identity 7 and a continuation
    pub fn endless() -> Self {
        Self {
            pages: Vec::new(),
            endless: true,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    /// Every fetch fails
    pub fn failing(error: FetchError) -> Self {
        Self {
            pages: vec![Err(error)],
            endless: false,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    fn seed_url(&self, _credential: &str) -> Result<String, FetchError> {
        Ok("page:0".to_string())
    }

    async fn fetch_page(&self, url: &str) -> Result<FeedPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let index: usize = url
            .strip_prefix("page:")
            .and_then(|i| i.parse().ok())
            .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;
        if self.endless {
            return Ok(FeedPage::new(
                vec![status_from(7)],
                Some(format!("page:{}", index + 1)),
            ));
        }
        self.pages
            .get(index)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::Api(404, "no such page".to_string())))
    }
}

/// Status record authored by `author`
pub fn status_from(author: u64) -> Value {
    json!({"type": "status", "from": {"id": author.to_string()}})
}

/// Status record authored by `author` and liked by `liker`
pub fn status_liked(author: u64, liker: u64) -> Value {
    json!({
        "type": "status",
        "from": {"id": author.to_string()},
        "likes": {"count": 1, "data": [{"id": liker.to_string()}]}
    })
}

/// Backend where every operation fails
pub struct BrokenBackend;

#[async_trait]
impl CacheBackend for BrokenBackend {
    async fn get(&self, _key: &str) -> Result<Option<Value>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}

/// Live in-memory cache plus a selector over it, so tests can inspect entries
pub fn memory_caches() -> (Arc<dyn ResultCache>, CacheSelector) {
    let live: Arc<dyn ResultCache> = Arc::new(FailOpenCache::new(Arc::new(MemoryCache::new(100))));
    (Arc::clone(&live), CacheSelector::new(live))
}

/// Selector whose live cache always errors underneath
pub fn broken_caches() -> CacheSelector {
    CacheSelector::new(Arc::new(FailOpenCache::new(Arc::new(BrokenBackend))))
}
