//! Per-subscription liveness timer.
//!
//! A timer is owned by its subscription; dropping the subscription is the
//! only way to cancel it.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessTimer {
    period_ms: u64,
    next_due_ms: u64,
}

impl LivenessTimer {
    /// Start a recurring timer; the first signal is due one period from now.
    pub fn start(period_ms: u64, now_ms: u64) -> Self {
        let period_ms = period_ms.max(1);
        Self {
            period_ms,
            next_due_ms: now_ms.saturating_add(period_ms),
        }
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        now_ms >= self.next_due_ms
    }

    pub fn next_due_ms(&self) -> u64 {
        self.next_due_ms
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Schedule the next signal. Missed periods are skipped, not replayed.
    pub fn rearm(&mut self, now_ms: u64) {
        let mut next = self.next_due_ms.saturating_add(self.period_ms);
        if next <= now_ms {
            next = now_ms.saturating_add(self.period_ms);
        }
        self.next_due_ms = next;
    }
}
