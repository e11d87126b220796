use std::fmt;

use crate::storage::StorageError;

/// Boxed error type for faults originating in downstream handlers.
///
/// Handler faults are carried through unmodified so the transport layer
/// can apply its own dead-lettering policy.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level fault taxonomy for a coordinator invocation.
#[derive(Debug)]
pub enum InboxError {
    /// The inbound message context carried no message id. Caller contract
    /// violation: no transaction is opened and no retry happens.
    MissingMessageId,
    /// The record was changed by another writer between the locking read
    /// and the intended write within one attempt.
    Concurrency {
        message_id: String,
        consumer_id: String,
    },
    /// Storage-engine-reported retriable condition (deadlock, serialization
    /// failure). The retry strategy decides whether to re-run the attempt.
    Transient(String),
    /// Generic, non-retriable storage fault.
    Storage(String),
    /// The message's cancellation signal fired during the handling phase.
    Cancelled,
    /// Fault raised by the downstream handler, propagated unmodified.
    Handler(BoxError),
}

impl InboxError {
    /// Whether a retry strategy may transparently re-run the attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, InboxError::Transient(_))
    }
}

impl fmt::Display for InboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboxError::MissingMessageId => {
                write!(f, "inbound message context carries no message id")
            }
            InboxError::Concurrency {
                message_id,
                consumer_id,
            } => write!(
                f,
                "concurrent write detected for inbox record ({}, {})",
                message_id, consumer_id
            ),
            InboxError::Transient(message) => {
                write!(f, "transient storage fault: {}", message)
            }
            InboxError::Storage(message) => write!(f, "storage fault: {}", message),
            InboxError::Cancelled => write!(f, "message processing cancelled"),
            InboxError::Handler(source) => write!(f, "handler fault: {}", source),
        }
    }
}

impl std::error::Error for InboxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InboxError::Handler(source) => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<StorageError> for InboxError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Concurrency {
                message_id,
                consumer_id,
            } => InboxError::Concurrency {
                message_id,
                consumer_id,
            },
            StorageError::Transient(message) => InboxError::Transient(message),
            StorageError::Storage(message) => InboxError::Storage(message),
            StorageError::Cancelled => InboxError::Cancelled,
        }
    }
}
