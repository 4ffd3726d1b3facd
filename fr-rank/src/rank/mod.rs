//! Friend rank engine
//!
//! A job walks the subject's paginated feed, counts how often each other
//! identity appears, and reports progress while it runs:
//!
//! ```text
//! RequestCoordinator ──spawn──> PaginationScheduler ──records──> IdExtractor ──ids──> Aggregator
//!        │                             │
//!        │                             ├── every tick ──> ProgressEmitter ──snapshots──┐
//!        │                             └── once ───────> CompletionSignal ──outcome───┤
//!        │                                                                            ├──> CacheTierPolicy
//!        └────────────────── first snapshot or outcome <───────────────────────────────┘
//! ```
//!
//! Each job is a single tokio task owning its queue, budget and counts, so
//! no state is shared between the fetch completions it interleaves.

pub mod aggregator;
pub mod cache_policy;
pub mod completion;
pub mod coordinator;
pub mod extractor;
pub mod progress;
pub mod scheduler;

pub use aggregator::Aggregator;
pub use cache_policy::{CacheTier, CacheTierPolicy, RankResult, ResultVariant, TtlPolicy};
pub use completion::{CompletionSignal, CompletionWatcher, JobError, JobOutcome};
pub use coordinator::{RankRequest, RequestCoordinator};
pub use extractor::extract_ids;
pub use progress::{ProgressEmitter, ProgressSubscription};
pub use scheduler::{JobConfig, JobState, PaginationScheduler};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Numeric identity of a feed actor
pub type Identity = u64;

/// Identity → number of appearances
pub type IdentityCounts = BTreeMap<Identity, u64>;

/// Point-in-time view of a running job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub data: IdentityCounts,
    /// Fraction of the page budget consumed, in [0, 1]
    pub progress: f64,
}
