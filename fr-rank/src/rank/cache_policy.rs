//! Two-tier result caching
//!
//! Partial entries (short TTL) hold in-progress snapshots; final entries
//! (long TTL) hold completed results. For one job:
//! - a partial is written only if its progress is strictly greater than the
//!   last partial written, and only while no final has been written
//! - a partial is also refused when the key already holds a final entry,
//!   whichever job wrote it
//! - the final result is written unconditionally on success
//! - nothing is written on failure

use fr_common::cache::ResultCache;
use fr_common::config::CacheConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::completion::{CompletionWatcher, JobOutcome};
use super::progress::ProgressSubscription;
use super::{Identity, IdentityCounts, ProgressSnapshot};

/// Cache entry class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    Partial,
    Final,
}

/// A rendered result, as cached and as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankResult {
    pub tier: CacheTier,
    pub progress: f64,
    pub data: Value,
}

impl RankResult {
    pub fn partial(data: Value, progress: f64) -> Self {
        Self {
            tier: CacheTier::Partial,
            progress,
            data,
        }
    }

    pub fn complete(data: Value) -> Self {
        Self {
            tier: CacheTier::Final,
            progress: 1.0,
            data,
        }
    }

    pub fn is_final(&self) -> bool {
        self.tier == CacheTier::Final
    }

    /// Decode a cached value; anything unrecognizable reads as a miss
    pub fn from_cached(value: Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }

    pub fn to_cached(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Result semantics, each with its own cache key namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultVariant {
    /// Identity → appearance count map
    FriendRank,
    /// Identities ordered by descending count
    FriendSort,
}

impl ResultVariant {
    pub fn key_prefix(&self) -> &'static str {
        match self {
            ResultVariant::FriendRank => "friend_rank",
            ResultVariant::FriendSort => "friend_sort",
        }
    }

    pub fn cache_key(&self, identity: Identity) -> String {
        format!("{}::{}", self.key_prefix(), identity)
    }

    /// Render counts in this variant's response shape
    pub fn render(&self, counts: &IdentityCounts) -> Value {
        match self {
            ResultVariant::FriendRank => {
                let map = counts
                    .iter()
                    .map(|(id, count)| (id.to_string(), Value::from(*count)))
                    .collect::<serde_json::Map<_, _>>();
                Value::Object(map)
            }
            ResultVariant::FriendSort => {
                let mut ranked: Vec<(&Identity, &u64)> = counts.iter().collect();
                ranked.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
                Value::Array(ranked.into_iter().map(|(id, _)| Value::from(*id)).collect())
            }
        }
    }
}

/// Partial and final entry lifetimes
#[derive(Debug, Clone, Copy)]
pub struct TtlPolicy {
    pub partial_ttl: Duration,
    pub final_ttl: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            partial_ttl: Duration::from_secs(30),
            final_ttl: Duration::from_secs(60 * 60),
        }
    }
}

impl From<&CacheConfig> for TtlPolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            partial_ttl: config.partial_ttl(),
            final_ttl: config.final_ttl(),
        }
    }
}

/// Writes one job's snapshots and result to the cache
pub struct CacheTierPolicy {
    cache: Arc<dyn ResultCache>,
    key: String,
    variant: ResultVariant,
    ttls: TtlPolicy,
    last_partial: Option<f64>,
    final_written: bool,
}

impl CacheTierPolicy {
    pub fn new(
        cache: Arc<dyn ResultCache>,
        identity: Identity,
        variant: ResultVariant,
        ttls: TtlPolicy,
    ) -> Self {
        Self {
            cache,
            key: variant.cache_key(identity),
            variant,
            ttls,
            last_partial: None,
            final_written: false,
        }
    }

    /// Write a partial entry if the ordering rules allow it; returns whether it was written
    pub async fn on_snapshot(&mut self, snapshot: &ProgressSnapshot) -> bool {
        if self.final_written {
            return false;
        }
        if self.last_partial.map_or(false, |last| snapshot.progress <= last) {
            return false;
        }

        // Other jobs write the same key; never step back from what is cached
        match self.cache.get(&self.key).await.and_then(RankResult::from_cached) {
            Some(cached) if cached.is_final() => {
                debug!(key = %self.key, "Final result already cached, skipping partial");
                return false;
            }
            Some(cached) if cached.progress >= snapshot.progress => {
                debug!(
                    key = %self.key,
                    cached = cached.progress,
                    progress = snapshot.progress,
                    "Cached partial is further along, skipping"
                );
                return false;
            }
            _ => {}
        }

        self.last_partial = Some(snapshot.progress);
        let entry = RankResult::partial(self.variant.render(&snapshot.data), snapshot.progress);
        self.cache
            .set(&self.key, entry.to_cached(), self.ttls.partial_ttl)
            .await;
        debug!(key = %self.key, progress = snapshot.progress, "Cached partial result");
        true
    }

    /// Write the final entry on success; returns whether anything was written
    pub async fn on_completion(&mut self, outcome: &JobOutcome) -> bool {
        match outcome {
            Ok(result) => {
                let entry = RankResult::complete(self.variant.render(&result.data));
                self.cache
                    .set(&self.key, entry.to_cached(), self.ttls.final_ttl)
                    .await;
                self.final_written = true;
                info!(key = %self.key, "Cached final result");
                true
            }
            Err(e) => {
                info!(key = %self.key, "Job failed, leaving cache untouched: {}", e);
                false
            }
        }
    }

    /// Follow a job's snapshots and outcome on a background task
    pub fn spawn(
        self,
        progress: ProgressSubscription,
        completion: CompletionWatcher,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(progress, completion))
    }

    async fn run(mut self, mut progress: ProgressSubscription, mut completion: CompletionWatcher) {
        loop {
            tokio::select! {
                // Snapshots published before the outcome are handled first
                biased;

                snapshot = progress.next() => match snapshot {
                    Some(snapshot) => {
                        self.on_snapshot(&snapshot).await;
                    }
                    None => {
                        let outcome = completion.wait().await;
                        self.on_completion(&outcome).await;
                        return;
                    }
                },
                outcome = completion.wait() => {
                    self.on_completion(&outcome).await;
                    return;
                }
            }
        }
    }
}
