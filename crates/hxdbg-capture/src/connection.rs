//! Connection gating between a capture source and the relay.
//!
//! Pure state machine: the agent reports send and self-test outcomes, the
//! machine says when the next self-test should go out. Time is passed in.

use serde::{Deserialize, Serialize};

use hxdbg_core::config::CaptureConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    /// Not connected and nothing scheduled.
    Idle,
    /// A self-test is in flight (`retry_at_ms` is `None`) or will be
    /// re-sent at `retry_at_ms` after the previous one failed.
    Connecting { retry_at_ms: Option<u64> },
    Connected,
    /// A send failed; the next self-test goes out at `retry_at_ms`.
    BackingOff { attempt: u32, retry_at_ms: u64 },
    /// Held by the circuit breaker until `until_ms`.
    CircuitBroken { until_ms: u64 },
}

/// What a failed send or self-test scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    /// Reconnection `attempt` scheduled at `retry_at_ms`.
    Backoff { attempt: u32, retry_at_ms: u64 },
    /// Self-test re-sent at `retry_at_ms` without using up an attempt.
    Retest { retry_at_ms: u64 },
    /// Reconnection attempts exhausted; the caller trips the breaker.
    Exhausted,
    /// Nothing new scheduled.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    max_attempts: u32,
    reconnect_delay_ms: u64,
    probe_retry_ms: u64,
    state: LinkState,
    attempts: u32,
}

impl ConnectionMachine {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            max_attempts: config.max_reconnect_attempts,
            reconnect_delay_ms: config.reconnect_delay_ms,
            probe_retry_ms: config.probe_retry_ms,
            state: LinkState::Idle,
            attempts: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start a self-test from `Idle`. Returns `true` if one should be sent.
    pub fn begin_probe(&mut self) -> bool {
        if self.state == LinkState::Idle {
            self.state = LinkState::Connecting { retry_at_ms: None };
            true
        } else {
            false
        }
    }

    /// Periodic verification. A connected link is re-verified in place.
    pub fn periodic_check(&mut self) -> bool {
        match self.state {
            LinkState::Connected => true,
            LinkState::Idle => self.begin_probe(),
            _ => false,
        }
    }

    pub fn on_probe_ok(&mut self) {
        if matches!(self.state, LinkState::CircuitBroken { .. }) {
            return;
        }
        self.state = LinkState::Connected;
        self.attempts = 0;
    }

    /// A failed self-test while reconnecting uses up an attempt; outside
    /// reconnection it is simply re-sent after `probe_retry_ms`.
    pub fn on_probe_failed(&mut self, now_ms: u64) -> Reconnect {
        match self.state {
            LinkState::CircuitBroken { .. } | LinkState::BackingOff { .. } => Reconnect::Unchanged,
            _ if self.attempts > 0 => self.schedule_attempt(now_ms),
            _ => {
                let retry_at_ms = now_ms.saturating_add(self.probe_retry_ms);
                self.state = LinkState::Connecting {
                    retry_at_ms: Some(retry_at_ms),
                };
                Reconnect::Retest { retry_at_ms }
            }
        }
    }

    pub fn on_send_ok(&mut self) {
        self.attempts = 0;
    }

    pub fn on_send_failed(&mut self, now_ms: u64) -> Reconnect {
        if self.state != LinkState::Connected {
            return Reconnect::Unchanged;
        }
        self.schedule_attempt(now_ms)
    }

    fn schedule_attempt(&mut self, now_ms: u64) -> Reconnect {
        if self.attempts >= self.max_attempts {
            self.state = LinkState::Idle;
            return Reconnect::Exhausted;
        }
        self.attempts += 1;
        let retry_at_ms = now_ms.saturating_add(self.reconnect_delay_ms);
        self.state = LinkState::BackingOff {
            attempt: self.attempts,
            retry_at_ms,
        };
        Reconnect::Backoff {
            attempt: self.attempts,
            retry_at_ms,
        }
    }

    /// Returns `true` when a scheduled self-test is due.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        let due = match self.state {
            LinkState::Connecting {
                retry_at_ms: Some(at),
            } => now_ms >= at,
            LinkState::BackingOff { retry_at_ms, .. } => now_ms >= retry_at_ms,
            _ => false,
        };
        if due {
            self.state = LinkState::Connecting { retry_at_ms: None };
        }
        due
    }

    pub fn next_due_ms(&self) -> Option<u64> {
        match self.state {
            LinkState::Connecting { retry_at_ms } => retry_at_ms,
            LinkState::BackingOff { retry_at_ms, .. } => Some(retry_at_ms),
            _ => None,
        }
    }

    pub fn suspend(&mut self, until_ms: u64) {
        self.state = LinkState::CircuitBroken { until_ms };
    }

    /// Leave the breaker hold with a fresh attempt budget. Returns `true`
    /// when a self-test should be sent.
    pub fn resume(&mut self) -> bool {
        self.attempts = 0;
        if matches!(self.state, LinkState::CircuitBroken { .. }) {
            self.state = LinkState::Connecting { retry_at_ms: None };
            true
        } else {
            false
        }
    }

    /// Drop the link entirely (host context went away).
    pub fn disconnect(&mut self) {
        self.state = LinkState::Idle;
    }
}
