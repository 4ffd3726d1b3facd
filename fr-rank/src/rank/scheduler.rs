//! Pagination scheduler: the job state machine
//!
//! ```text
//! Seeded ──tick──> Dispatching ──> AwaitingBatch ──tick──> Dispatching ...
//!                                       │
//!                                       ├── budget hits 0, fetches still out ──> Draining
//!                                       ├── budget 0 and nothing in flight ────> Completed
//!                                       └── any fetch error ───────────────────> Failed
//! ```
//!
//! Every tick drains the whole queue into one batch and fires one fetch per
//! URL. Fetch completions are applied as they arrive. Each completion uses
//! up one unit of budget; a page without a continuation (or arriving when
//! only one unit remains) forces the budget to zero, so the depth limit is a
//! hard ceiling. The job owns all of its state and runs as one task, so
//! draining the queue and enqueuing continuations never interleave.

use futures::stream::{FuturesUnordered, StreamExt};
use fr_common::config::FeedConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::completion::{CompletionSignal, JobError};
use super::extractor::extract_ids;
use super::progress::ProgressEmitter;
use super::{Aggregator, Identity, ProgressSnapshot};
use crate::feed::{redact_url, FeedPage, FeedSource, FetchError};

/// Shortest tick period a job will run with
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Per-job limits
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Maximum pages fetched by one job
    pub depth_limit: u32,
    /// Period between batch dispatches and progress snapshots
    pub tick_interval: Duration,
    /// Upper bound on a single page fetch
    pub fetch_timeout: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            depth_limit: 5,
            tick_interval: Duration::from_millis(100),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&FeedConfig> for JobConfig {
    fn from(config: &FeedConfig) -> Self {
        Self {
            depth_limit: config.depth_limit.max(1),
            tick_interval: config.tick_interval().max(MIN_TICK_INTERVAL),
            fetch_timeout: config.fetch_timeout(),
        }
    }
}

/// Job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Seed URL queued, nothing dispatched yet
    Seeded,
    /// Handing a batch of queued URLs to the feed source
    Dispatching,
    /// Fetches outstanding, budget left
    AwaitingBatch,
    /// Budget exhausted, letting outstanding fetches finish
    Draining,
    Completed,
    Failed,
}

/// One pagination-and-aggregation run for a single subject
pub struct PaginationScheduler {
    job_id: Uuid,
    subject: Identity,
    feed: Arc<dyn FeedSource>,
    config: JobConfig,
    emitter: ProgressEmitter,
    completion: CompletionSignal,
    queue: Vec<String>,
    budget: u32,
    issued: u32,
    aggregator: Aggregator,
    state: JobState,
}

impl PaginationScheduler {
    pub fn new(
        subject: Identity,
        seed_url: String,
        feed: Arc<dyn FeedSource>,
        config: JobConfig,
        emitter: ProgressEmitter,
        completion: CompletionSignal,
    ) -> Self {
        let budget = config.depth_limit;
        Self {
            job_id: Uuid::new_v4(),
            subject,
            feed,
            config,
            emitter,
            completion,
            queue: vec![seed_url],
            budget,
            issued: 0,
            aggregator: Aggregator::new(),
            state: JobState::Seeded,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn remaining_budget(&self) -> u32 {
        self.budget
    }

    /// Run the job on its own task
    pub fn spawn(self) -> JoinHandle<JobState> {
        tokio::spawn(self.run())
    }

    /// Drive the job until the completion signal is resolved
    pub async fn run(mut self) -> JobState {
        info!(
            job_id = %self.job_id,
            subject = self.subject,
            depth_limit = self.config.depth_limit,
            "Friend rank job started"
        );

        let mut ticker = tokio::time::interval(self.config.tick_interval.max(MIN_TICK_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight = FuturesUnordered::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.state == JobState::Draining {
                        // No dispatches, no snapshots
                        continue;
                    }

                    let batch = self.drain_queue();
                    if !batch.is_empty() {
                        self.transition(JobState::Dispatching);
                        debug!(job_id = %self.job_id, batch_size = batch.len(), "Dispatching batch");
                        for url in batch {
                            if self.issued >= self.config.depth_limit {
                                debug!(job_id = %self.job_id, url = %redact_url(&url), "Depth limit reached, dropping queued page");
                                continue;
                            }
                            self.issued += 1;
                            in_flight.push(fetch_with_timeout(
                                Arc::clone(&self.feed),
                                url,
                                self.config.fetch_timeout,
                            ));
                        }
                    }

                    if in_flight.is_empty() {
                        // Nothing queued, nothing outstanding: no page will ever arrive
                        self.budget = 0;
                        self.complete();
                        return JobState::Completed;
                    }
                    self.transition(JobState::AwaitingBatch);

                    let mut data = self.aggregator.snapshot();
                    data.remove(&self.subject);
                    self.emitter.publish(self.budget, data);
                }
                Some(result) = in_flight.next(), if !in_flight.is_empty() => {
                    match result {
                        Ok(page) => {
                            self.apply_page(page);
                            if self.budget == 0 {
                                if in_flight.is_empty() {
                                    self.complete();
                                    return JobState::Completed;
                                }
                                self.transition(JobState::Draining);
                            }
                        }
                        Err(e) => {
                            self.transition(JobState::Failed);
                            warn!(job_id = %self.job_id, subject = self.subject, "Friend rank job failed: {}", e);
                            self.completion.fail(JobError::Fetch(e));
                            return JobState::Failed;
                        }
                    }
                }
            }
        }
    }

    fn transition(&mut self, next: JobState) {
        if self.state != next {
            debug!(job_id = %self.job_id, from = ?self.state, to = ?next, "Job state change");
            self.state = next;
        }
    }

    /// Take every queued URL, leaving the queue empty
    fn drain_queue(&mut self) -> Vec<String> {
        std::mem::take(&mut self.queue)
    }

    /// Count a page's records and decide whether to follow its continuation
    fn apply_page(&mut self, page: FeedPage) {
        let records = page.records();
        for record in records {
            self.aggregator.apply(extract_ids(record));
        }

        match page.next_url() {
            Some(next) if self.budget > 1 => self.queue.push(next.to_string()),
            _ => self.budget = 0,
        }
        self.budget = self.budget.saturating_sub(1);

        debug!(
            job_id = %self.job_id,
            records = records.len(),
            remaining_budget = self.budget,
            queued = self.queue.len(),
            "Applied feed page"
        );
    }

    /// Finalize the counts and resolve the completion signal with success
    fn complete(&mut self) {
        let data = std::mem::take(&mut self.aggregator).finalize(self.subject);
        self.transition(JobState::Completed);
        info!(
            job_id = %self.job_id,
            subject = self.subject,
            pages = self.issued,
            identities = data.len(),
            "Friend rank job completed"
        );
        self.completion.succeed(ProgressSnapshot {
            data,
            progress: 1.0,
        });
    }
}

async fn fetch_with_timeout(
    feed: Arc<dyn FeedSource>,
    url: String,
    timeout: Duration,
) -> Result<FeedPage, FetchError> {
    match tokio::time::timeout(timeout, feed.fetch_page(&url)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeFeed {
        pages: Vec<Result<FeedPage, FetchError>>,
        endless: bool,
        delay: Duration,
        calls: AtomicU32,
    }

    impl FakeFeed {
        fn chain(pages: Vec<Vec<Value>>) -> Self {
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

        fn endless() -> Self {
            Self {
                pages: Vec::new(),
                endless: true,
                delay: Duration::ZERO,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FeedSource for FakeFeed {
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
                    vec![json!({"type": "status", "from": {"id": "7"}})],
                    Some(format!("page:{}", index + 1)),
                ));
            }
            self.pages
                .get(index)
                .cloned()
                .unwrap_or_else(|| Err(FetchError::Api(404, "no such page".to_string())))
        }
    }

    fn scheduler(feed: Arc<FakeFeed>, config: JobConfig) -> (PaginationScheduler, CompletionSignal) {
        let completion = CompletionSignal::new();
        let emitter = ProgressEmitter::new(config.depth_limit, 64);
        let job = PaginationScheduler::new(
            100,
            "page:0".to_string(),
            feed,
            config,
            emitter,
            completion.clone(),
        );
        (job, completion)
    }

    #[test]
    fn test_budget_decreases_and_is_forced_to_zero() {
        let (mut job, _) = scheduler(Arc::new(FakeFeed::endless()), JobConfig::default());
        let mut budgets = vec![job.remaining_budget()];

        for i in 1..=2 {
            job.drain_queue();
            job.apply_page(FeedPage::new(vec![], Some(format!("page:{}", i))));
            budgets.push(job.remaining_budget());
        }
        job.drain_queue();
        job.apply_page(FeedPage::new(vec![], None));
        budgets.push(job.remaining_budget());

        assert_eq!(budgets, vec![5, 4, 3, 0]);
        assert!(job.queue.is_empty());
    }

    #[test]
    fn test_last_budget_unit_ignores_continuation() {
        let config = JobConfig {
            depth_limit: 1,
            ..JobConfig::default()
        };
        let (mut job, _) = scheduler(Arc::new(FakeFeed::endless()), config);
        job.drain_queue();
        job.apply_page(FeedPage::new(vec![], Some("page:1".to_string())));

        assert_eq!(job.remaining_budget(), 0);
        assert!(job.queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_depth_ceiling_with_endless_feed() {
        let feed = Arc::new(FakeFeed::endless());
        let config = JobConfig {
            depth_limit: 3,
            ..JobConfig::default()
        };
        let (job, completion) = scheduler(Arc::clone(&feed), config);

        let final_state = job.run().await;

        assert_eq!(final_state, JobState::Completed);
        assert_eq!(feed.calls(), 3);
        let result = completion.outcome().unwrap().unwrap();
        assert_eq!(result.progress, 1.0);
        assert_eq!(result.data.get(&7), Some(&3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subject_excluded_from_result_and_snapshots() {
        let feed = Arc::new(FakeFeed::chain(vec![
            vec![json!({
                "type": "status",
                "from": {"id": "100"},
                "comments": {"count": 1, "data": [{"from": {"id": "100"}}]}
            })],
            vec![json!({"type": "status", "from": {"id": "5"}, "to": {"id": "100"}})],
        ]));
        let (job, completion) = scheduler(Arc::clone(&feed), JobConfig::default());
        let mut progress = job.emitter.subscribe();

        job.spawn().await.unwrap();

        while let Some(snapshot) = progress.next().await {
            assert!(!snapshot.data.contains_key(&100));
        }
        let result = completion.outcome().unwrap().unwrap();
        assert!(!result.data.contains_key(&100));
        assert_eq!(result.data.get(&5), Some(&1));
        assert_eq!(feed.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_fails_job_and_stops_snapshots() {
        let mut feed = FakeFeed::chain(vec![vec![json!({"from": {"id": "1"}})], vec![]]);
        feed.pages[1] = Err(FetchError::Api(500, "upstream".to_string()));
        let feed = Arc::new(feed);
        let (job, completion) = scheduler(Arc::clone(&feed), JobConfig::default());
        let mut progress = job.emitter.subscribe();

        let final_state = job.spawn().await.unwrap();

        assert_eq!(final_state, JobState::Failed);
        assert_eq!(
            completion.outcome(),
            Some(Err(JobError::Fetch(FetchError::Api(500, "upstream".to_string()))))
        );
        let mut last = None;
        while let Some(snapshot) = progress.next().await {
            last = Some(snapshot.progress);
        }
        assert!(last.map_or(true, |p| p < 1.0));
    }

    #[test]
    fn test_zero_tick_interval_is_clamped() {
        let feed_config = FeedConfig {
            tick_interval_ms: 0,
            ..FeedConfig::default()
        };
        assert_eq!(JobConfig::from(&feed_config).tick_interval, MIN_TICK_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_tick_job_still_completes() {
        let feed = Arc::new(FakeFeed::chain(vec![vec![json!({"from": {"id": "4"}})]]));
        let config = JobConfig {
            tick_interval: Duration::ZERO,
            ..JobConfig::default()
        };
        let (job, completion) = scheduler(Arc::clone(&feed), config);

        assert_eq!(job.run().await, JobState::Completed);
        assert_eq!(completion.outcome().unwrap().unwrap().data.get(&4), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_depth_completes_without_fetching() {
        let feed = Arc::new(FakeFeed::endless());
        let config = JobConfig {
            depth_limit: 0,
            ..JobConfig::default()
        };
        let (job, completion) = scheduler(Arc::clone(&feed), config);

        assert_eq!(job.run().await, JobState::Completed);
        assert_eq!(feed.calls(), 0);
        assert!(completion.outcome().unwrap().unwrap().data.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_fetch_times_out() {
        let mut feed = FakeFeed::endless();
        feed.delay = Duration::from_secs(3600);
        let config = JobConfig {
            fetch_timeout: Duration::from_secs(2),
            ..JobConfig::default()
        };
        let (job, completion) = scheduler(Arc::new(feed), config);

        assert_eq!(job.run().await, JobState::Failed);
        assert_eq!(
            completion.outcome(),
            Some(Err(JobError::Fetch(FetchError::Timeout(Duration::from_secs(2)))))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_pages_give_strictly_increasing_progress() {
        let mut feed = FakeFeed::endless();
        feed.delay = Duration::from_millis(350);
        let (job, completion) = scheduler(Arc::new(feed), JobConfig::default());
        let mut progress = job.emitter.subscribe();

        job.spawn();

        let mut seen = Vec::new();
        while let Some(snapshot) = progress.next().await {
            seen.push(snapshot.progress);
        }
        assert!(!seen.is_empty());
        assert_eq!(seen[0], 0.0);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert!(completion.is_resolved());
    }
}
