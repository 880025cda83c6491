//! Stale-read guard for background view fills.
//!
//! Each refresh of a view takes a fresh [`Epoch`] from the shared
//! [`RefreshEpoch`] and tags its [`ReadRequest`] with it. When the answer
//! comes back, [`RefreshEpoch::accept`] drops it if a newer refresh has been
//! started in the meantime.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(u64);

impl Epoch {
    #[inline]
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Monotonic epoch counter, cheap to clone and share across threads.
#[derive(Debug, Clone, Default)]
pub struct RefreshEpoch {
    current: Arc<AtomicU64>,
}

impl RefreshEpoch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new refresh. Every epoch handed out before is now stale.
    pub fn advance(&self) -> Epoch {
        Epoch(self.current.fetch_add(1, Ordering::AcqRel) + 1)
    }

    #[must_use]
    pub fn current(&self) -> Epoch {
        Epoch(self.current.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.current() == epoch
    }

    /// Passes `response` through only if no newer refresh has started.
    #[must_use]
    pub fn accept(&self, response: ReadResponse) -> Option<ReadResponse> {
        if self.is_current(response.epoch) {
            Some(response)
        } else {
            tracing::debug!(
                stale = response.epoch.value(),
                current = self.current().value(),
                "dropping stale read"
            );
            None
        }
    }
}

/// A window of the edited view to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub epoch: Epoch,
    pub start: u64,
    pub count: usize,
    pub hide_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    pub epoch: Epoch,
    pub start: u64,
    pub cells: Vec<hex_core::buffer::LogicalByte>,
}
