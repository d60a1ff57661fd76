use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::trace;

/// Monotonic id handed to each load attempt.
pub type Ticket = u64;

/// Last-issued-wins arbitration for asynchronous loads.
///
/// Clones share the counter, so a spawned task can hold one and check its
/// ticket when the load settles.
#[derive(Debug, Clone, Default)]
pub struct RaceResolver {
    counter: Arc<AtomicU64>,
}

impl RaceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> Ticket {
        self.counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn latest(&self) -> Ticket {
        self.counter.load(Ordering::Acquire)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest() == ticket
    }

    /// Orphans every outstanding ticket without starting a new load.
    pub fn invalidate(&self) {
        self.counter.fetch_add(1, Ordering::AcqRel);
    }

    /// Awaits `work` and yields its output only if `ticket` is still the
    /// latest one at settlement.
    pub async fn settle<F>(&self, ticket: Ticket, work: F) -> Option<F::Output>
    where
        F: Future,
    {
        let output = work.await;
        if self.is_current(ticket) {
            Some(output)
        } else {
            trace!(target = "query_sync.ticket", ticket, latest = self.latest(), "discarding stale result");
            None
        }
    }
}
