//! Progress snapshots published on every scheduler tick

use tokio::sync::broadcast;
use tracing::debug;

use super::{IdentityCounts, ProgressSnapshot};

/// Default number of snapshots buffered per subscriber
pub const DEFAULT_CAPACITY: usize = 64;

/// Fraction of the page budget consumed: `(depth_limit - remaining) / depth_limit`
pub fn progress_fraction(depth_limit: u32, remaining_budget: u32) -> f64 {
    if depth_limit == 0 {
        return 1.0;
    }
    let consumed = depth_limit - remaining_budget.min(depth_limit);
    f64::from(consumed) / f64::from(depth_limit)
}

/// Publishing side, owned by the job
///
/// Dropping the emitter ends every subscription.
pub struct ProgressEmitter {
    tx: broadcast::Sender<ProgressSnapshot>,
    depth_limit: u32,
}

impl ProgressEmitter {
    pub fn new(depth_limit: u32, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, depth_limit }
    }

    pub fn subscribe(&self) -> ProgressSubscription {
        ProgressSubscription {
            rx: self.tx.subscribe(),
            last_progress: None,
        }
    }

    /// Publish one snapshot to every current subscriber
    pub fn publish(&self, remaining_budget: u32, data: IdentityCounts) -> ProgressSnapshot {
        let snapshot = ProgressSnapshot {
            data,
            progress: progress_fraction(self.depth_limit, remaining_budget),
        };
        // No subscribers is fine: nobody is waiting on this job
        let _ = self.tx.send(snapshot.clone());
        snapshot
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Receiving side of a [`ProgressEmitter`]
///
/// Yields only snapshots whose progress is strictly greater than the last one
/// it yielded. Ticks that saw no new page repeat the previous progress and
/// are skipped here.
pub struct ProgressSubscription {
    rx: broadcast::Receiver<ProgressSnapshot>,
    last_progress: Option<f64>,
}

impl ProgressSubscription {
    /// Next advancing snapshot, or `None` once the job has stopped publishing
    ///
    /// Cancel safe.
    pub async fn next(&mut self) -> Option<ProgressSnapshot> {
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => {
                    if self.last_progress.map_or(true, |last| snapshot.progress > last) {
                        self.last_progress = Some(snapshot.progress);
                        return Some(snapshot);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Progress subscriber lagged, skipped {} snapshots", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn last_progress(&self) -> Option<f64> {
        self.last_progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_progress_fraction() {
        assert_eq!(progress_fraction(5, 5), 0.0);
        assert_eq!(progress_fraction(5, 4), 0.2);
        assert_eq!(progress_fraction(5, 0), 1.0);
        assert_eq!(progress_fraction(4, 9), 0.0);
    }

    #[tokio::test]
    async fn test_subscription_skips_repeated_progress() {
        let emitter = ProgressEmitter::new(5, 16);
        let mut sub = emitter.subscribe();

        emitter.publish(5, BTreeMap::new());
        emitter.publish(5, BTreeMap::new());
        emitter.publish(4, BTreeMap::from([(1, 1)]));
        emitter.publish(4, BTreeMap::from([(1, 1)]));
        emitter.publish(2, BTreeMap::from([(1, 3)]));
        drop(emitter);

        let mut seen = Vec::new();
        while let Some(snapshot) = sub.next().await {
            seen.push(snapshot.progress);
        }
        assert_eq!(seen, vec![0.0, 0.2, 0.6]);
        assert_eq!(sub.last_progress(), Some(0.6));
    }

    #[tokio::test]
    async fn test_lagged_subscriber_keeps_newest() {
        let emitter = ProgressEmitter::new(5, 2);
        let mut sub = emitter.subscribe();

        for remaining in (1..=5).rev() {
            emitter.publish(remaining, BTreeMap::new());
        }

        let snapshot = sub.next().await.expect("Should receive a snapshot");
        assert!(snapshot.progress >= 0.6);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let emitter = ProgressEmitter::new(5, 4);
        let snapshot = emitter.publish(3, BTreeMap::new());
        assert_eq!(snapshot.progress, 0.4);
        assert_eq!(emitter.subscriber_count(), 0);
    }
}
