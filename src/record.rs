use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable row tracking receipt and processing state for one
/// (message, consumer) pair.
///
/// Created exactly once per pair on first observed receipt; every later
/// claim increments [`receive_count`](Self::receive_count) and rotates the
/// lock token. `received_at` is set once and never mutated.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct InboxRecord {
    pub message_id: String,
    pub consumer_id: String,
    pub received_at: SystemTime,
    /// Opaque per-claim token. Written on every claim for stale-claim
    /// diagnostics and log correlation; mutual exclusion comes from the
    /// row lock, not from this value.
    pub lock_token: Uuid,
    /// How many times this record has been claimed for processing after
    /// its initial creation.
    pub receive_count: u32,
}

impl InboxRecord {
    /// Create the record for a first observed receipt.
    pub fn new(
        message_id: impl Into<String>,
        consumer_id: impl Into<String>,
        lock_token: Uuid,
    ) -> Self {
        InboxRecord {
            message_id: message_id.into(),
            consumer_id: consumer_id.into(),
            received_at: SystemTime::now(),
            lock_token,
            receive_count: 0,
        }
    }

    /// Claim the record for a processing pass: bump the receive count and
    /// rotate the lock token.
    pub fn claim(&mut self, lock_token: Uuid) {
        self.receive_count += 1;
        self.lock_token = lock_token;
    }

    /// Composite identity of this record.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            message_id: self.message_id.clone(),
            consumer_id: self.consumer_id.clone(),
        }
    }
}

/// Composite key: at most one inbox record exists per (message, consumer)
/// pair.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub message_id: String,
    pub consumer_id: String,
}

impl RecordKey {
    pub fn new(message_id: impl Into<String>, consumer_id: impl Into<String>) -> Self {
        RecordKey {
            message_id: message_id.into(),
            consumer_id: consumer_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_starts_unclaimed() {
        let token = Uuid::new_v4();
        let record = InboxRecord::new("m1", "c1", token);

        assert_eq!(record.message_id, "m1");
        assert_eq!(record.consumer_id, "c1");
        assert_eq!(record.lock_token, token);
        assert_eq!(record.receive_count, 0);
    }

    #[test]
    fn claim_bumps_count_and_rotates_token() {
        let first = Uuid::new_v4();
        let mut record = InboxRecord::new("m1", "c1", first);
        let received_at = record.received_at;

        let second = Uuid::new_v4();
        record.claim(second);

        assert_eq!(record.receive_count, 1);
        assert_eq!(record.lock_token, second);
        assert_eq!(record.received_at, received_at); // set once, never mutated

        record.claim(Uuid::new_v4());
        assert_eq!(record.receive_count, 2);
    }

    #[test]
    fn key_identifies_the_pair() {
        let record = InboxRecord::new("m1", "c1", Uuid::new_v4());
        assert_eq!(record.key(), RecordKey::new("m1", "c1"));
        assert_ne!(record.key(), RecordKey::new("m1", "c2"));
    }
}
