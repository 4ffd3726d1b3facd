//! Single-resolution completion signal
//!
//! A job resolves its signal exactly once, with success or failure. Later
//! resolution attempts are ignored. Watchers created after resolution see
//! the stored outcome immediately, so a late subscriber cannot miss it.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use super::ProgressSnapshot;
use crate::feed::FetchError;

/// Why a job did not produce a result
#[derive(Debug, Error, Clone, PartialEq)]
pub enum JobError {
    /// A page fetch failed; fatal to the job
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The job task went away without resolving (panic or runtime shutdown)
    #[error("Job ended without producing a result")]
    Abandoned,
}

/// Terminal outcome of a job
pub type JobOutcome = Result<ProgressSnapshot, JobError>;

/// Resolving side, held by the job
#[derive(Clone)]
pub struct CompletionSignal {
    tx: Arc<watch::Sender<Option<JobOutcome>>>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Resolve with success; returns false if already resolved
    pub fn succeed(&self, result: ProgressSnapshot) -> bool {
        self.resolve(Ok(result))
    }

    /// Resolve with failure; returns false if already resolved
    pub fn fail(&self, error: JobError) -> bool {
        self.resolve(Err(error))
    }

    fn resolve(&self, outcome: JobOutcome) -> bool {
        let mut outcome = Some(outcome);
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = outcome.take();
                true
            } else {
                false
            }
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Stored outcome, if resolved
    pub fn outcome(&self) -> Option<JobOutcome> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> CompletionWatcher {
        CompletionWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Waiting side of a [`CompletionSignal`]
pub struct CompletionWatcher {
    rx: watch::Receiver<Option<JobOutcome>>,
}

impl CompletionWatcher {
    /// Wait for the outcome; returns at once if already resolved
    ///
    /// Cancel safe.
    pub async fn wait(&mut self) -> JobOutcome {
        loop {
            if let Some(outcome) = self.rx.borrow_and_update().clone() {
                return outcome;
            }
            if self.rx.changed().await.is_err() {
                return self.rx.borrow().clone().unwrap_or(Err(JobError::Abandoned));
            }
        }
    }
}
