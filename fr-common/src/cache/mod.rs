//! Result cache interface and adapters
//!
//! Two layers:
//! - [`CacheBackend`]: a raw store whose operations may fail
//! - [`ResultCache`]: the fail-open interface the rank engine consumes.
//!   Errors never cross it; a failed get reads as absent and a failed set
//!   is dropped after logging.
//!
//! A process constructs one backend at startup and shares it across every
//! request through a [`CacheSelector`], which also hands out the no-op
//! adapter when a caller asks to bypass the cache.

mod memory;

pub use memory::MemoryCache;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Raw cache backend errors
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Backend unreachable or refused the operation
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Raw key-value store with per-entry TTL
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;
}

/// Fail-open cache interface
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Cached value for `key`, or `None` if absent, expired or unreadable
    async fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key` for `ttl`; failures are logged and ignored
    async fn set(&self, key: &str, value: Value, ttl: Duration);
}

/// Wraps a [`CacheBackend`] so its errors degrade to "no cached value"
pub struct FailOpenCache {
    backend: Arc<dyn CacheBackend>,
}

impl FailOpenCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ResultCache for FailOpenCache {
    async fn get(&self, key: &str) -> Option<Value> {
        match self.backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, "Cache get failed: {}", e);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        if let Err(e) = self.backend.set(key, value, ttl).await {
            warn!(key = %key, "Cache set failed: {}", e);
        }
    }
}

/// Bypass adapter: every get misses, every set is discarded
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl ResultCache for NoopCache {
    async fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    async fn set(&self, _key: &str, _value: Value, _ttl: Duration) {}
}

/// Chooses the live cache or the bypass adapter per request
#[derive(Clone)]
pub struct CacheSelector {
    live: Arc<dyn ResultCache>,
    bypass: Arc<dyn ResultCache>,
}

impl CacheSelector {
    pub fn new(live: Arc<dyn ResultCache>) -> Self {
        Self {
            live,
            bypass: Arc::new(NoopCache),
        }
    }

    /// Live cache over an in-process [`MemoryCache`] holding at most `max_entries`
    pub fn in_memory(max_entries: usize) -> Self {
        Self::new(Arc::new(FailOpenCache::new(Arc::new(MemoryCache::new(
            max_entries,
        )))))
    }

    /// `bypass = true` forces recomputation: reads miss and writes are dropped
    pub fn select(&self, bypass: bool) -> Arc<dyn ResultCache> {
        if bypass {
            Arc::clone(&self.bypass)
        } else {
            Arc::clone(&self.live)
        }
    }
}
