use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use crate::message::CancellationToken;
use crate::record::{InboxRecord, RecordKey};
use crate::statement::LockStatement;

use super::{InboxStorage, IsolationLevel, StorageError};

/// Queued failures for exercising the retry and rollback paths.
#[derive(Default)]
struct FaultPlan {
    transient_row_ops: u32,
    conflict_updates: u32,
    fail_next_commit: bool,
    fail_next_rollback: bool,
}

/// Counters for observing coordinator/storage interaction in tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub begun: u32,
    pub committed: u32,
    pub rolled_back: u32,
}

/// In-process storage engine backed by a `HashMap` and one async mutex
/// per record key.
///
/// This is the reference implementation of [`InboxStorage`]: `lock_read`
/// acquires the row's mutex into the transaction, so a second attempt for
/// the same pair suspends until the first commits or rolls back while
/// different pairs never contend. Writes are staged per transaction and
/// applied on commit, discarded on rollback.
///
/// Fault injection hooks drive the transient-retry, conflict, and
/// rollback-diagnostic test scenarios.
pub struct InMemoryInboxStorage {
    rows: Mutex<HashMap<RecordKey, InboxRecord>>,
    row_locks: Mutex<HashMap<RecordKey, Arc<RowLock<()>>>>,
    faults: Mutex<FaultPlan>,
    stats: Mutex<StorageStats>,
}

/// Transaction handle: staged writes plus the row locks acquired so far.
/// Dropping it releases the locks.
pub struct InMemoryTx {
    isolation: IsolationLevel,
    guards: HashMap<RecordKey, OwnedMutexGuard<()>>,
    staged: HashMap<RecordKey, InboxRecord>,
}

impl InMemoryTx {
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }
}

impl InMemoryInboxStorage {
    pub fn new() -> Self {
        InMemoryInboxStorage {
            rows: Mutex::new(HashMap::new()),
            row_locks: Mutex::new(HashMap::new()),
            faults: Mutex::new(FaultPlan::default()),
            stats: Mutex::new(StorageStats::default()),
        }
    }

    /// Committed record for a pair, if any.
    pub fn record(&self, message_id: &str, consumer_id: &str) -> Option<InboxRecord> {
        let rows = self.rows.lock().ok()?;
        rows.get(&RecordKey::new(message_id, consumer_id)).cloned()
    }

    /// Number of committed records.
    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StorageStats {
        self.stats.lock().map(|stats| *stats).unwrap_or_default()
    }

    /// Fail the next `count` row operations with a transient fault.
    pub fn fail_row_ops(&self, count: u32) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.transient_row_ops = count;
        }
    }

    /// Report a data-concurrency conflict on the next update.
    pub fn conflict_next_update(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.conflict_updates += 1;
        }
    }

    /// Fail the next commit with a transient fault.
    pub fn fail_next_commit(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.fail_next_commit = true;
        }
    }

    /// Fail the next rollback with a generic storage fault.
    pub fn fail_next_rollback(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.fail_next_rollback = true;
        }
    }

    fn take_transient(&self, operation: &str) -> Result<(), StorageError> {
        let mut faults = self
            .faults
            .lock()
            .map_err(|_| StorageError::Storage("fault plan poisoned".into()))?;
        if faults.transient_row_ops > 0 {
            faults.transient_row_ops -= 1;
            return Err(StorageError::Transient(format!(
                "injected deadlock during {}",
                operation
            )));
        }
        Ok(())
    }

    fn row_lock(&self, key: &RecordKey) -> Result<Arc<RowLock<()>>, StorageError> {
        let mut locks = self
            .row_locks
            .lock()
            .map_err(|_| StorageError::Storage("row lock table poisoned".into()))?;
        Ok(locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RowLock::new(())))
            .clone())
    }
}

impl Default for InMemoryInboxStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InboxStorage for InMemoryInboxStorage {
    type Tx = InMemoryTx;

    async fn begin(&self, isolation: IsolationLevel) -> Result<Self::Tx, StorageError> {
        let mut stats = self
            .stats
            .lock()
            .map_err(|_| StorageError::Storage("stats poisoned".into()))?;
        stats.begun += 1;

        Ok(InMemoryTx {
            isolation,
            guards: HashMap::new(),
            staged: HashMap::new(),
        })
    }

    async fn lock_read(
        &self,
        tx: &mut Self::Tx,
        _statement: &LockStatement,
        message_id: &str,
        consumer_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<InboxRecord>, StorageError> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        self.take_transient("lock read")?;

        let key = RecordKey::new(message_id, consumer_id);
        if !tx.guards.contains_key(&key) {
            // Must not hold the lock-table mutex across the await.
            let lock = self.row_lock(&key)?;
            let guard = lock.lock_owned().await;
            tx.guards.insert(key.clone(), guard);
        }

        if let Some(record) = tx.staged.get(&key) {
            return Ok(Some(record.clone()));
        }
        let rows = self
            .rows
            .lock()
            .map_err(|_| StorageError::Storage("row table poisoned".into()))?;
        Ok(rows.get(&key).cloned())
    }

    async fn insert(
        &self,
        tx: &mut Self::Tx,
        record: &InboxRecord,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        self.take_transient("insert")?;

        let key = record.key();
        let exists = tx.staged.contains_key(&key) || {
            let rows = self
                .rows
                .lock()
                .map_err(|_| StorageError::Storage("row table poisoned".into()))?;
            rows.contains_key(&key)
        };
        if exists {
            return Err(StorageError::Storage(format!(
                "duplicate inbox record ({}, {})",
                record.message_id, record.consumer_id
            )));
        }

        tx.staged.insert(key, record.clone());
        Ok(())
    }

    async fn update(
        &self,
        tx: &mut Self::Tx,
        record: &InboxRecord,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        self.take_transient("update")?;

        {
            let mut faults = self
                .faults
                .lock()
                .map_err(|_| StorageError::Storage("fault plan poisoned".into()))?;
            if faults.conflict_updates > 0 {
                faults.conflict_updates -= 1;
                return Err(StorageError::Concurrency {
                    message_id: record.message_id.clone(),
                    consumer_id: record.consumer_id.clone(),
                });
            }
        }

        let key = record.key();
        let known = tx.staged.contains_key(&key) || {
            let rows = self
                .rows
                .lock()
                .map_err(|_| StorageError::Storage("row table poisoned".into()))?;
            rows.contains_key(&key)
        };
        if !known {
            return Err(StorageError::Concurrency {
                message_id: record.message_id.clone(),
                consumer_id: record.consumer_id.clone(),
            });
        }

        tx.staged.insert(key, record.clone());
        Ok(())
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StorageError> {
        {
            let mut faults = self
                .faults
                .lock()
                .map_err(|_| StorageError::Storage("fault plan poisoned".into()))?;
            if faults.fail_next_commit {
                faults.fail_next_commit = false;
                // Dropping `tx` releases the row locks, like a connection
                // reset would.
                return Err(StorageError::Transient("injected deadlock during commit".into()));
            }
        }

        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StorageError::Storage("row table poisoned".into()))?;
        for (key, record) in tx.staged {
            rows.insert(key, record);
        }
        drop(rows);

        let mut stats = self
            .stats
            .lock()
            .map_err(|_| StorageError::Storage("stats poisoned".into()))?;
        stats.committed += 1;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StorageError> {
        drop(tx); // discard staged writes, release row locks

        let mut faults = self
            .faults
            .lock()
            .map_err(|_| StorageError::Storage("fault plan poisoned".into()))?;
        if faults.fail_next_rollback {
            faults.fail_next_rollback = false;
            return Err(StorageError::Storage("injected rollback failure".into()));
        }
        drop(faults);

        let mut stats = self
            .stats
            .lock()
            .map_err(|_| StorageError::Storage("stats poisoned".into()))?;
        stats.rolled_back += 1;
        Ok(())
    }
}
