//! Request coordinator: compute once, cache, return
//!
//! Turns a running job into one awaitable call for request handlers. A
//! cached final result short-circuits everything. A cached partial does not:
//! it may be left over from a failed job. Otherwise a job is started
//! and the caller waits either for the outcome (blocking mode) or for
//! whichever comes first of the first snapshot and the outcome (progressive
//! mode). The cache policy follows the job regardless of mode, so the cache
//! keeps warming after a progressive caller has been answered.

use fr_common::cache::CacheSelector;
use std::sync::Arc;
use tracing::{debug, info};

use super::cache_policy::{CacheTierPolicy, RankResult, ResultVariant, TtlPolicy};
use super::completion::{CompletionSignal, JobError, JobOutcome};
use super::progress::{ProgressEmitter, DEFAULT_CAPACITY};
use super::scheduler::{JobConfig, PaginationScheduler};
use super::Identity;
use crate::feed::FeedSource;

/// One caller's request
#[derive(Debug, Clone)]
pub struct RankRequest {
    pub identity: Identity,
    pub credential: String,
    pub variant: ResultVariant,
    /// Answer with the first snapshot instead of waiting for completion
    pub progressive: bool,
    /// Ignore cached results and discard this job's writes
    pub bypass_cache: bool,
}

impl RankRequest {
    pub fn new(identity: Identity, credential: impl Into<String>) -> Self {
        Self {
            identity,
            credential: credential.into(),
            variant: ResultVariant::FriendRank,
            progressive: true,
            bypass_cache: false,
        }
    }

    pub fn variant(mut self, variant: ResultVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn progressive(mut self, progressive: bool) -> Self {
        self.progressive = progressive;
        self
    }

    pub fn bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }
}

/// Shared entry point for all requests; constructed once per process
#[derive(Clone)]
pub struct RequestCoordinator {
    feed: Arc<dyn FeedSource>,
    caches: CacheSelector,
    job_config: JobConfig,
    ttls: TtlPolicy,
}

impl RequestCoordinator {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        caches: CacheSelector,
        job_config: JobConfig,
        ttls: TtlPolicy,
    ) -> Self {
        Self {
            feed,
            caches,
            job_config,
            ttls,
        }
    }

    /// Cached result, or the outcome of a freshly started job
    pub async fn compute(&self, request: &RankRequest) -> Result<RankResult, JobError> {
        let cache = self.caches.select(request.bypass_cache);
        let key = request.variant.cache_key(request.identity);

        if let Some(cached) = cache
            .get(&key)
            .await
            .and_then(RankResult::from_cached)
            .filter(RankResult::is_final)
        {
            debug!(key = %key, "Serving final result from cache");
            return Ok(cached);
        }

        let seed_url = self.feed.seed_url(&request.credential)?;

        let emitter = ProgressEmitter::new(self.job_config.depth_limit, DEFAULT_CAPACITY);
        let completion = CompletionSignal::new();
        let mut first_snapshot = emitter.subscribe();
        let mut outcome = completion.subscribe();

        CacheTierPolicy::new(cache, request.identity, request.variant, self.ttls)
            .spawn(emitter.subscribe(), completion.subscribe());

        let job = PaginationScheduler::new(
            request.identity,
            seed_url,
            Arc::clone(&self.feed),
            self.job_config.clone(),
            emitter,
            completion,
        );
        info!(
            job_id = %job.job_id(),
            key = %key,
            progressive = request.progressive,
            "Cache miss, starting friend rank job"
        );
        job.spawn();

        if request.progressive {
            tokio::select! {
                biased;

                result = outcome.wait() => render_outcome(request.variant, result),
                Some(snapshot) = first_snapshot.next() => Ok(RankResult::partial(
                    request.variant.render(&snapshot.data),
                    snapshot.progress,
                )),
            }
        } else {
            render_outcome(request.variant, outcome.wait().await)
        }
    }
}

fn render_outcome(variant: ResultVariant, outcome: JobOutcome) -> Result<RankResult, JobError> {
    outcome.map(|result| RankResult::complete(variant.render(&result.data)))
}
