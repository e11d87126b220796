use std::fmt;

/// Faults reported by the storage engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The record changed unexpectedly between the locking read and the
    /// intended write within one attempt. Indicates a true conflicting
    /// writer, not redelivery; the coordinator does not retry it itself.
    Concurrency {
        message_id: String,
        consumer_id: String,
    },
    /// Retriable condition such as a deadlock or serialization failure.
    Transient(String),
    /// Any other storage fault.
    Storage(String),
    /// The operation observed a fired cancellation signal.
    Cancelled,
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Concurrency {
                message_id,
                consumer_id,
            } => write!(
                f,
                "inbox record ({}, {}) changed by a concurrent writer",
                message_id, consumer_id
            ),
            StorageError::Transient(message) => {
                write!(f, "transient storage fault: {}", message)
            }
            StorageError::Storage(message) => write!(f, "storage fault: {}", message),
            StorageError::Cancelled => write!(f, "storage operation cancelled"),
        }
    }
}

impl std::error::Error for StorageError {}
