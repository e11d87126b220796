use std::time::Duration;

use async_trait::async_trait;

use crate::error::InboxError;

/// Outcome of one completed claim attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Insert-only first phase committed; the coordinator re-enters the
    /// loop so the next pass handles the now-existing record.
    Reclaim,
    /// Handling phase committed; `keep_processing` carries the handler's
    /// continue flag (true unless the handler cleared it).
    Handled { keep_processing: bool },
}

impl AttemptOutcome {
    /// Whether the coordinator's claim loop runs another pass.
    pub fn run_again(self) -> bool {
        match self {
            AttemptOutcome::Reclaim => true,
            AttemptOutcome::Handled { keep_processing } => keep_processing,
        }
    }
}

/// One full transactional claim attempt, re-runnable by a retry strategy.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn attempt(&mut self) -> Result<AttemptOutcome, InboxError>;
}

/// Decides whether a faulted attempt is re-run transparently.
///
/// Only [`InboxError::is_transient`] faults are candidates; everything
/// else propagates. Orthogonal to the coordinator's continue loop, which
/// governs protocol phases rather than fault resilience.
#[async_trait]
pub trait RetryStrategy: Send + Sync {
    async fn run(&self, work: &mut dyn UnitOfWork) -> Result<AttemptOutcome, InboxError>;
}

/// Default strategy: execute the attempt once, retry nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecuteOnce;

#[async_trait]
impl RetryStrategy for ExecuteOnce {
    async fn run(&self, work: &mut dyn UnitOfWork) -> Result<AttemptOutcome, InboxError> {
        work.attempt().await
    }
}

/// Re-runs attempts that fail with a transient storage fault, with a
/// linearly growing backoff between attempts.
#[derive(Clone, Copy, Debug)]
pub struct TransientRetry {
    max_attempts: u32,
    backoff: Duration,
}

impl Default for TransientRetry {
    fn default() -> Self {
        TransientRetry {
            max_attempts: 5,
            backoff: Duration::from_millis(50),
        }
    }
}

impl TransientRetry {
    pub fn new() -> Self {
        TransientRetry::default()
    }

    /// Total attempt budget, the first execution included.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Base delay; attempt `n` waits `n * backoff` before re-running.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl RetryStrategy for TransientRetry {
    async fn run(&self, work: &mut dyn UnitOfWork) -> Result<AttemptOutcome, InboxError> {
        let mut attempt = 1;
        loop {
            match work.attempt().await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    tracing::debug!(attempt, error = %err, "re-running claim attempt after transient fault");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
