//! Shared handler doubles for the coordinator test suites.

// Each test binary compiles its own copy; not every binary uses every helper.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use inboxed::storage::InMemoryTx;
use inboxed::{BoxError, HandlerContext, InboxHandler, ReceivedMessage};

/// Records every invocation's receive count, optionally fails the first
/// few invocations, and clears the continue flag after a configured
/// number of calls.
pub struct RecordingHandler {
    invocations: Mutex<Vec<u32>>,
    stop_after: u32,
    fail_first: AtomicU32,
}

impl RecordingHandler {
    /// Stops processing after the first invocation.
    pub fn new() -> Self {
        RecordingHandler {
            invocations: Mutex::new(Vec::new()),
            stop_after: 1,
            fail_first: AtomicU32::new(0),
        }
    }

    /// Clear the continue flag after `count` invocations instead of one.
    pub fn with_stop_after(mut self, count: u32) -> Self {
        self.stop_after = count;
        self
    }

    /// Fail the first `count` invocations with a handler fault.
    pub fn with_failures(self, count: u32) -> Self {
        self.fail_first.store(count, Ordering::SeqCst);
        self
    }

    /// Receive counts observed by each invocation, failed ones included.
    pub fn invocations(&self) -> Vec<u32> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn calls(&self) -> u32 {
        self.invocations.lock().unwrap().len() as u32
    }
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InboxHandler<ReceivedMessage, InMemoryTx> for RecordingHandler {
    async fn handle(
        &self,
        ctx: &mut HandlerContext<'_, ReceivedMessage, InMemoryTx>,
    ) -> Result<(), BoxError> {
        let call = {
            let mut invocations = self.invocations.lock().unwrap();
            invocations.push(ctx.record().receive_count);
            invocations.len() as u32
        };

        if self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err("injected handler fault".into());
        }

        if call >= self.stop_after {
            ctx.stop_processing();
        }
        Ok(())
    }
}

/// Holds the row lock for a while and tracks how many handler
/// invocations overlap, to prove same-pair passes never interleave.
pub struct GateHandler {
    active: AtomicUsize,
    max_active: AtomicUsize,
    hold: Duration,
}

impl GateHandler {
    pub fn holding_for(hold: Duration) -> Self {
        GateHandler {
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            hold,
        }
    }

    /// Highest number of concurrently running handler invocations seen.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InboxHandler<ReceivedMessage, InMemoryTx> for GateHandler {
    async fn handle(
        &self,
        ctx: &mut HandlerContext<'_, ReceivedMessage, InMemoryTx>,
    ) -> Result<(), BoxError> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        tokio::time::sleep(self.hold).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        ctx.stop_processing();
        Ok(())
    }
}

/// Waits on a shared barrier inside the handler: completes only if the
/// other party's handler runs at the same time.
pub struct BarrierHandler {
    barrier: Arc<tokio::sync::Barrier>,
}

impl BarrierHandler {
    pub fn new(barrier: Arc<tokio::sync::Barrier>) -> Self {
        BarrierHandler { barrier }
    }
}

#[async_trait]
impl InboxHandler<ReceivedMessage, InMemoryTx> for BarrierHandler {
    async fn handle(
        &self,
        ctx: &mut HandlerContext<'_, ReceivedMessage, InMemoryTx>,
    ) -> Result<(), BoxError> {
        self.barrier.wait().await;
        ctx.stop_processing();
        Ok(())
    }
}
