//! Running appearance counts for one job

use std::collections::HashMap;

use super::{Identity, IdentityCounts};

/// Identity → count tally, mutated only by the job that owns it
#[derive(Debug, Default, Clone)]
pub struct Aggregator {
    counts: HashMap<Identity, u64>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count each id once per occurrence in `ids`
    pub fn apply<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = Identity>,
    {
        for id in ids {
            *self.counts.entry(id).or_insert(0) += 1;
        }
    }

    /// Copy of the current counts
    pub fn snapshot(&self) -> IdentityCounts {
        self.counts.iter().map(|(id, count)| (*id, *count)).collect()
    }

    /// Terminal counts with the subject's own entry removed
    pub fn finalize(mut self, subject: Identity) -> IdentityCounts {
        self.counts.remove(&subject);
        self.snapshot()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
