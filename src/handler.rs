//! Context passed to downstream message handlers.
//!
//! A narrow capability bundle: the original message, the open
//! transaction, a snapshot of the claimed inbox record, and the
//! continue-processing flag. Handlers never see the coordinator itself.

use async_trait::async_trait;

use crate::error::BoxError;
use crate::record::InboxRecord;

/// The context passed to a handler for one claimed processing pass.
///
/// The transaction is exposed for the duration of this single invocation
/// so handler side effects commit atomically with the inbox bookkeeping;
/// it must not be retained beyond the call.
pub struct HandlerContext<'a, M, Tx> {
    message: &'a M,
    transaction: &'a mut Tx,
    record: InboxRecord,
    keep_processing: bool,
}

impl<'a, M, Tx> HandlerContext<'a, M, Tx> {
    pub(crate) fn new(message: &'a M, transaction: &'a mut Tx, record: InboxRecord) -> Self {
        HandlerContext {
            message,
            transaction,
            record,
            keep_processing: true,
        }
    }

    /// The inbound message, passed through from the transport untouched.
    pub fn message(&self) -> &M {
        self.message
    }

    /// The open transaction. Changes made through it commit together with
    /// the inbox record update.
    pub fn transaction(&mut self) -> &mut Tx {
        self.transaction
    }

    /// Snapshot of the inbox record as claimed for this pass.
    pub fn record(&self) -> &InboxRecord {
        &self.record
    }

    /// Signal that no further redelivery-driven pass is needed. The flag
    /// defaults to true; the coordinator re-enters its loop until a
    /// handler clears it.
    pub fn stop_processing(&mut self) {
        self.keep_processing = false;
    }

    pub fn keep_processing(&self) -> bool {
        self.keep_processing
    }
}

/// Downstream handler pipe: the business-logic stage invoked once per
/// claimed processing pass.
///
/// Faults propagate to the coordinator unmodified; the transaction is
/// rolled back and the fault surfaces to the transport layer.
#[async_trait]
pub trait InboxHandler<M, Tx>: Send + Sync
where
    M: Sync,
    Tx: Send,
{
    async fn handle(&self, ctx: &mut HandlerContext<'_, M, Tx>) -> Result<(), BoxError>;
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn flag_defaults_to_continue() {
        let message = "m1";
        let mut tx = ();
        let record = InboxRecord::new("m1", "c1", Uuid::new_v4());
        let ctx = HandlerContext::new(&message, &mut tx, record);

        assert!(ctx.keep_processing());
    }

    #[test]
    fn stop_processing_clears_the_flag() {
        let message = "m1";
        let mut tx = ();
        let record = InboxRecord::new("m1", "c1", Uuid::new_v4());
        let mut ctx = HandlerContext::new(&message, &mut tx, record);

        ctx.stop_processing();
        assert!(!ctx.keep_processing());
    }

    #[test]
    fn exposes_the_claimed_record() {
        let message = "m1";
        let mut tx = ();
        let mut record = InboxRecord::new("m1", "c1", Uuid::new_v4());
        record.claim(Uuid::new_v4());
        let ctx = HandlerContext::new(&message, &mut tx, record.clone());

        assert_eq!(ctx.record(), &record);
        assert_eq!(ctx.record().receive_count, 1);
    }
}
