//! The inbox coordinator: a two-phase, row-locked claim protocol that
//! turns at-least-once delivery into effectively-exactly-once handling
//! per (message, consumer) pair.
//!
//! ```text
//!  message ──▶ loop ──▶ begin tx ──▶ locking read
//!                           │
//!            record absent ─┤─ record present
//!                           │         │
//!              insert (count 0)   claim (count +1)
//!              commit             update + invoke handler
//!              re-enter loop      commit
//!                                 loop while handler keeps the flag set
//! ```
//!
//! The first receipt deliberately commits an insert-only transaction and
//! re-enters the loop: the handling pass then finds the record and holds
//! its row lock for the full handler duration, so racing redeliveries
//! block on the lock instead of racing the insert. Folding both phases
//! into one transaction would hold the lock across the handler on first
//! receipt; the split is intentional.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::{InboxConfig, ProbeDescriptor};
use crate::error::InboxError;
use crate::handler::{HandlerContext, InboxHandler};
use crate::message::MessageContext;
use crate::record::InboxRecord;
use crate::retry::{AttemptOutcome, ExecuteOnce, RetryStrategy, UnitOfWork};
use crate::statement::{LockStatement, LockStatementProvider};
use crate::storage::InboxStorage;

/// Orchestrates the claim protocol over a storage engine and a lock
/// statement provider.
///
/// # Example
///
/// ```ignore
/// let storage = Arc::new(InMemoryInboxStorage::new());
/// let coordinator = InboxCoordinator::new(storage, PostgresLockStatements)
///     .with_config(InboxConfig::new("orders"))
///     .with_retry(TransientRetry::new());
///
/// coordinator.process(&message, &handler).await?;
/// ```
pub struct InboxCoordinator<S, P> {
    storage: Arc<S>,
    provider: P,
    config: InboxConfig,
    retry: Box<dyn RetryStrategy>,
    // Computed once per coordinator lifetime, immutable after that.
    statement: OnceLock<LockStatement>,
}

impl<S, P> InboxCoordinator<S, P>
where
    S: InboxStorage,
    P: LockStatementProvider,
{
    /// Coordinator with the default configuration and no retry.
    pub fn new(storage: Arc<S>, provider: P) -> Self {
        InboxCoordinator {
            storage,
            provider,
            config: InboxConfig::default(),
            retry: Box::new(ExecuteOnce),
            statement: OnceLock::new(),
        }
    }

    pub fn with_config(mut self, config: InboxConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_retry(mut self, retry: impl RetryStrategy + 'static) -> Self {
        self.retry = Box::new(retry);
        self
    }

    pub fn config(&self) -> &InboxConfig {
        &self.config
    }

    /// Read-only descriptor for observability tooling.
    pub fn probe(&self) -> ProbeDescriptor {
        ProbeDescriptor {
            component: "outboxContextFactory",
            provider: self.provider.name(),
        }
    }

    fn statement(&self) -> &LockStatement {
        self.statement.get_or_init(|| {
            self.provider.statement_for(
                &self.config.table,
                &self.config.id_column,
                &self.config.consumer_column,
            )
        })
    }

    /// Process one inbound message through the claim protocol.
    ///
    /// Loops until a handling pass clears the continue flag. Each pass is
    /// one transaction, submitted to the configured retry strategy; any
    /// fault not absorbed by the strategy surfaces here unmodified for
    /// the transport's redelivery or dead-lettering policy.
    pub async fn process<M, H>(&self, message: &M, handler: &H) -> Result<(), InboxError>
    where
        M: MessageContext,
        H: InboxHandler<M, S::Tx>,
    {
        let message_id = match message.message_id() {
            Some(id) => id.to_string(),
            None => return Err(InboxError::MissingMessageId),
        };

        let mut run_again = true;
        while run_again {
            let mut attempt = ClaimAttempt {
                coordinator: self,
                message,
                handler,
                message_id: message_id.as_str(),
            };
            let outcome = self.retry.run(&mut attempt).await?;
            run_again = outcome.run_again();
        }
        Ok(())
    }

    /// One full transactional attempt: begin, claim, commit, or on any
    /// fault roll back and re-raise.
    async fn run_attempt<M, H>(
        &self,
        message: &M,
        handler: &H,
        message_id: &str,
    ) -> Result<AttemptOutcome, InboxError>
    where
        M: MessageContext,
        H: InboxHandler<M, S::Tx>,
    {
        let statement = self.statement();
        let lock_token = Uuid::new_v4();

        let mut tx = self.storage.begin(self.config.isolation_level).await?;

        match self
            .claim(&mut tx, statement, message, handler, message_id, lock_token)
            .await
        {
            Ok(outcome) => {
                self.storage.commit(tx).await?;
                Ok(outcome)
            }
            Err(fault) => {
                // The rollback gets an unconditional chance to run; its
                // failure is a secondary diagnostic and never masks the
                // triggering fault.
                if let Err(rollback_err) = self.storage.rollback(tx).await {
                    tracing::warn!(
                        error = %rollback_err,
                        message_id,
                        consumer_id = %self.config.consumer_id,
                        "rollback failed after inbox claim fault"
                    );
                }
                Err(fault)
            }
        }
    }

    async fn claim<M, H>(
        &self,
        tx: &mut S::Tx,
        statement: &LockStatement,
        message: &M,
        handler: &H,
        message_id: &str,
        lock_token: Uuid,
    ) -> Result<AttemptOutcome, InboxError>
    where
        M: MessageContext,
        H: InboxHandler<M, S::Tx>,
    {
        let consumer_id = self.config.consumer_id.as_str();
        let cancel = message.cancellation();

        let existing = self
            .storage
            .lock_read(tx, statement, message_id, consumer_id, cancel)
            .await?;

        match existing {
            None => {
                // First observed claim: insert-only, commit, re-enter the
                // loop. The handler never runs in this pass.
                let record = InboxRecord::new(message_id, consumer_id, lock_token);
                self.storage.insert(tx, &record, cancel).await?;
                tracing::debug!(
                    message_id,
                    consumer_id,
                    "inbox record created, reclaiming for handling"
                );
                Ok(AttemptOutcome::Reclaim)
            }
            Some(mut record) => {
                // Subsequent claim, row lock held: bump the receipt
                // bookkeeping, then hand off to the handler inside the
                // same transaction.
                record.claim(lock_token);
                self.storage.update(tx, &record, cancel).await?;

                tracing::debug!(
                    message_id,
                    consumer_id,
                    receive_count = record.receive_count,
                    "invoking handler for claimed inbox record"
                );

                let mut ctx = HandlerContext::new(message, tx, record);
                handler.handle(&mut ctx).await.map_err(InboxError::Handler)?;
                let keep_processing = ctx.keep_processing();

                Ok(AttemptOutcome::Handled { keep_processing })
            }
        }
    }
}

/// Adapter submitting one coordinator attempt to the retry strategy.
struct ClaimAttempt<'a, S, P, M, H> {
    coordinator: &'a InboxCoordinator<S, P>,
    message: &'a M,
    handler: &'a H,
    message_id: &'a str,
}

#[async_trait]
impl<'a, S, P, M, H> UnitOfWork for ClaimAttempt<'a, S, P, M, H>
where
    S: InboxStorage,
    P: LockStatementProvider,
    M: MessageContext,
    H: InboxHandler<M, S::Tx>,
{
    async fn attempt(&mut self) -> Result<AttemptOutcome, InboxError> {
        self.coordinator
            .run_attempt(self.message, self.handler, self.message_id)
            .await
    }
}
