use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::message::CancellationToken;
use crate::record::InboxRecord;
use crate::statement::LockStatement;

use super::StorageError;

/// Isolation level for every transaction the coordinator opens.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Durable table of inbox records behind an ambient transaction.
///
/// The transaction handle is exclusively owned by one in-flight attempt;
/// the coordinator opens a fresh one per loop iteration and never shares
/// it across attempts. Row operations honor the cancellation token;
/// `rollback` deliberately takes none so it always gets a chance to run.
///
/// Implementations map [`StorageError::Transient`] to whatever their
/// engine reports as retriable (deadlock, serialization failure) and
/// [`StorageError::Concurrency`] to an unexpected change of the record
/// between read and write inside one transaction.
#[async_trait]
pub trait InboxStorage: Send + Sync {
    type Tx: Send;

    /// Open a new transaction at the given isolation level.
    async fn begin(&self, isolation: IsolationLevel) -> Result<Self::Tx, StorageError>;

    /// Execute the locking read for one (message, consumer) pair. Returns
    /// the record if present, acquiring its row lock for the duration of
    /// the transaction either way the engine supports.
    async fn lock_read(
        &self,
        tx: &mut Self::Tx,
        statement: &LockStatement,
        message_id: &str,
        consumer_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<InboxRecord>, StorageError>;

    /// Insert a freshly created record.
    async fn insert(
        &self,
        tx: &mut Self::Tx,
        record: &InboxRecord,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError>;

    /// Persist a claimed record's new state.
    async fn update(
        &self,
        tx: &mut Self::Tx,
        record: &InboxRecord,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError>;

    /// Commit the transaction, releasing its row locks.
    async fn commit(&self, tx: Self::Tx) -> Result<(), StorageError>;

    /// Roll the transaction back, releasing its row locks. Not subject to
    /// cancellation.
    async fn rollback(&self, tx: Self::Tx) -> Result<(), StorageError>;
}
