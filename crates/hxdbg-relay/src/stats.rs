//! Counters exposed by the coordinator for periodic stats logging.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStats {
    /// Entries processed since the last counter reset.
    pub processed: u64,
    /// Entries processed since start.
    pub processed_total: u64,
    /// Entries evicted by queue overflow since start.
    pub dropped_total: u64,
    /// Processing errors since start.
    pub errors_total: u64,
    /// Records consumed without delivery (self-tests, probes, unroutable).
    pub consumed_total: u64,
    /// Subscriptions purged because their channel was gone.
    pub purged_total: u64,
    pub queue_len: usize,
    /// How long the oldest queued entry has been waiting.
    pub oldest_queued_ms: Option<u64>,
    pub subscriptions: usize,
}

impl RelayStats {
    /// Reset the rolling processed counter, returning its previous value.
    pub fn reset_counter(&mut self) -> u64 {
        std::mem::take(&mut self.processed)
    }
}
