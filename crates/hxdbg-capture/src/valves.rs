//! Safety valves: volume cap and circuit breaker.
//!
//! Both are independent and reset themselves on their own schedule.

// ─── Volume cap ──────────────────────────────────────────────────

/// Rolling event counter. Once `cap` events were admitted, further events
/// are refused until `window_ms` has elapsed since the window started; the
/// next admitted event then opens a fresh window and counts as 1.
#[derive(Debug, Clone)]
pub struct VolumeCap {
    cap: u32,
    window_ms: u64,
    count: u32,
    window_started_ms: u64,
}

impl VolumeCap {
    pub fn new(cap: u32, window_ms: u64, now_ms: u64) -> Self {
        Self {
            cap: cap.max(1),
            window_ms,
            count: 0,
            window_started_ms: now_ms,
        }
    }

    pub fn admit(&mut self, now_ms: u64) -> bool {
        if self.count >= self.cap {
            if now_ms.saturating_sub(self.window_started_ms) < self.window_ms {
                return false;
            }
            self.count = 0;
            self.window_started_ms = now_ms;
        }
        self.count += 1;
        true
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset(&mut self, now_ms: u64) {
        self.count = 0;
        self.window_started_ms = now_ms;
    }
}

// ─── Circuit breaker ─────────────────────────────────────────────

/// Error counter that suspends capture for `cooldown_ms` once `error_cap`
/// errors accumulated.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    error_cap: u32,
    cooldown_ms: u64,
    errors: u32,
    open_until_ms: Option<u64>,
}

impl CircuitBreaker {
    pub fn new(error_cap: u32, cooldown_ms: u64) -> Self {
        Self {
            error_cap: error_cap.max(1),
            cooldown_ms,
            errors: 0,
            open_until_ms: None,
        }
    }

    /// Count one error. Returns `true` if this error tripped the breaker.
    pub fn record_error(&mut self, now_ms: u64) -> bool {
        self.errors = self.errors.saturating_add(1);
        self.errors >= self.error_cap && self.trip(now_ms)
    }

    /// Open the breaker. Tripping an open breaker does not extend it.
    pub fn trip(&mut self, now_ms: u64) -> bool {
        if self.open_until_ms.is_some() {
            return false;
        }
        self.open_until_ms = Some(now_ms.saturating_add(self.cooldown_ms));
        true
    }

    pub fn is_open(&self) -> bool {
        self.open_until_ms.is_some()
    }

    pub fn open_until_ms(&self) -> Option<u64> {
        self.open_until_ms
    }

    /// Close the breaker once the cooldown elapsed, clearing the error
    /// count. Returns `true` on the call that closes it.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        match self.open_until_ms {
            Some(until) if now_ms >= until => {
                self.open_until_ms = None;
                self.errors = 0;
                true
            }
            _ => false,
        }
    }

    pub fn errors(&self) -> u32 {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_cap_window_scenario() {
        let mut cap = VolumeCap::new(1_000, 60_000, 0);
        for i in 0..1_000u64 {
            assert!(cap.admit(i * 10), "event {i} within cap");
        }
        // 1001st within the same window.
        assert!(!cap.admit(30_000));
        assert!(!cap.admit(59_999));

        assert!(cap.admit(60_000));
        assert_eq!(cap.count(), 1);
    }

    #[test]
    fn volume_cap_does_not_reset_early_when_under_cap() {
        let mut cap = VolumeCap::new(3, 1_000, 0);
        assert!(cap.admit(0));
        assert!(cap.admit(5_000));
        assert_eq!(cap.count(), 2);
    }

    #[test]
    fn breaker_error_scenario() {
        let mut breaker = CircuitBreaker::new(50, 60_000);
        for i in 1..50 {
            assert!(!breaker.record_error(i), "error {i} must not trip");
        }
        assert!(breaker.record_error(50));
        assert!(breaker.is_open());

        // 51st error while open is counted but does not re-trip.
        assert!(!breaker.record_error(51));
        assert_eq!(breaker.open_until_ms(), Some(60_050));

        assert!(!breaker.poll(60_049));
        assert!(breaker.poll(60_050));
        assert!(!breaker.is_open());
        assert_eq!(breaker.errors(), 0);
    }

    #[test]
    fn manual_trip_is_idempotent() {
        let mut breaker = CircuitBreaker::new(5, 1_000);
        assert!(breaker.trip(10));
        assert!(!breaker.trip(500));
        assert_eq!(breaker.open_until_ms(), Some(1_010));
    }
}
