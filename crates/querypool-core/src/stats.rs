//! Pool statistics counters

use serde::{Deserialize, Serialize};

/// Lifetime counters for one query pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Queries handed to `submit`.
    pub submitted: u64,
    /// Queries sent to a connection (immediately or from the queue).
    pub dispatched: u64,
    /// Queries that had to wait in the pending queue.
    pub queued: u64,
    /// Queries that settled with a result.
    pub completed: u64,
    /// Queries that settled without a result.
    pub failed: u64,
    /// Callbacks that returned an error.
    pub callback_errors: u64,
    /// Connections opened through the factory.
    pub connections_created: u64,
    /// Completion passes run.
    pub passes: u64,
    /// Completion passes that settled nothing.
    pub empty_passes: u64,
}

impl PoolStats {
    /// Records a submission; `queued` says whether it spilled to the pending queue.
    #[inline]
    pub fn record_submit(&mut self, queued: bool) {
        self.submitted += 1;
        if queued {
            self.queued += 1;
        }
    }

    /// Records a dispatch onto a connection.
    #[inline]
    pub fn record_dispatch(&mut self) {
        self.dispatched += 1;
    }

    /// Records a settled query.
    #[inline]
    pub fn record_settled(&mut self, success: bool) {
        if success {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Records a completion pass and how many queries it settled.
    #[inline]
    pub fn record_pass(&mut self, settled: usize) {
        self.passes += 1;
        if settled == 0 {
            self.empty_passes += 1;
        }
    }

    /// Queries that have settled, successfully or not.
    pub fn settled(&self) -> u64 {
        self.completed + self.failed
    }
}
