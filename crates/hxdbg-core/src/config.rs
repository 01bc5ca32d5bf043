//! Tunable constants for the relay, capture sources, and panel sessions.
//!
//! Every struct deserializes from TOML with per-field defaults, so a config
//! file only needs to name the values it overrides:
//!
//! ```toml
//! [relay]
//! queue_capacity = 500
//!
//! [panel]
//! liveness_timeout_ms = 20000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ─── Relay ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Pending queue bound; inserting past it evicts the oldest entry.
    pub queue_capacity: usize,
    /// Maximum entries drained per tick.
    pub batch_max: usize,
    /// Wall-clock budget of one tick in milliseconds.
    pub tick_budget_ms: u64,
    /// Delay before the next tick when a tick leaves entries behind.
    pub reschedule_delay_ms: u64,
    /// Period of the per-subscription liveness signal.
    pub liveness_period_ms: u64,
    pub stats_log_interval_ms: u64,
    pub counter_reset_interval_ms: u64,
    pub keep_alive_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1_000,
            batch_max: 100,
            tick_budget_ms: 1_000,
            reschedule_delay_ms: 1_000,
            liveness_period_ms: 5_000,
            stats_log_interval_ms: 300_000,
            counter_reset_interval_ms: 3_600_000,
            keep_alive_interval_ms: 60_000,
        }
    }
}

// ─── Capture ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Events accepted per volume window before suppression.
    pub volume_cap: u32,
    pub volume_window_ms: u64,
    /// Internal errors tolerated before the circuit breaker trips.
    pub error_cap: u32,
    pub breaker_cooldown_ms: u64,
    pub max_reconnect_attempts: u32,
    /// Fixed backoff between reconnection attempts.
    pub reconnect_delay_ms: u64,
    /// Reentrancy bound of the instrumented processing entry point.
    pub max_process_depth: u32,
    pub connection_check_interval_ms: u64,
    /// Delay before re-sending a connection self-test that failed.
    pub probe_retry_ms: u64,
    /// Delay before reinitializing after the host context was invalidated.
    pub reinit_delay_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            volume_cap: 1_000,
            volume_window_ms: 60_000,
            error_cap: 50,
            breaker_cooldown_ms: 60_000,
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 30_000,
            max_process_depth: 100,
            connection_check_interval_ms: 5_000,
            probe_retry_ms: 1_000,
            reinit_delay_ms: 5_000,
        }
    }
}

// ─── Panel ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Silence longer than this marks the session disconnected.
    pub liveness_timeout_ms: u64,
    pub verify_interval_ms: u64,
    /// Drop records that carry neither a target nor any detail.
    pub suppress_empty_events: bool,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            liveness_timeout_ms: 60_000,
            verify_interval_ms: 30_000,
            suppress_empty_events: true,
        }
    }
}

// ─── Settings ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub relay: RelayConfig,
    pub capture: CaptureConfig,
    pub panel: PanelConfig,
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject configurations that break the relay's guarantees.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero_checks: [(&'static str, bool); 7] = [
            ("relay.queue_capacity", self.relay.queue_capacity == 0),
            ("relay.batch_max", self.relay.batch_max == 0),
            ("relay.liveness_period_ms", self.relay.liveness_period_ms == 0),
            ("capture.volume_cap", self.capture.volume_cap == 0),
            ("capture.error_cap", self.capture.error_cap == 0),
            ("capture.max_process_depth", self.capture.max_process_depth == 0),
            ("capture.volume_window_ms", self.capture.volume_window_ms == 0),
        ];
        if let Some((name, _)) = zero_checks.iter().find(|(_, is_zero)| *is_zero) {
            return Err(ConfigError::Zero(*name));
        }

        // One missed liveness signal must not flip the panel to disconnected.
        if self.panel.liveness_timeout_ms <= self.relay.liveness_period_ms {
            return Err(ConfigError::LivenessTimeoutTooShort {
                timeout_ms: self.panel.liveness_timeout_ms,
                period_ms: self.relay.liveness_period_ms,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().expect("defaults validate");
        assert_eq!(settings.relay.queue_capacity, 1000);
        assert_eq!(settings.relay.batch_max, 100);
        assert_eq!(settings.capture.error_cap, 50);
        assert_eq!(settings.panel.liveness_timeout_ms, 60_000);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [relay]
            queue_capacity = 10

            [capture]
            volume_cap = 3
            "#,
        )
        .expect("parse");
        assert_eq!(settings.relay.queue_capacity, 10);
        assert_eq!(settings.relay.batch_max, 100);
        assert_eq!(settings.capture.volume_cap, 3);
        assert_eq!(settings.capture.error_cap, 50);
        assert!(settings.panel.suppress_empty_events);
    }

    #[test]
    fn empty_toml_is_default() {
        let settings = Settings::from_toml_str("").expect("parse");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn liveness_timeout_must_exceed_period() {
        let err = Settings::from_toml_str(
            r#"
            [relay]
            liveness_period_ms = 5000
            [panel]
            liveness_timeout_ms = 5000
            "#,
        )
        .expect_err("equal timeout rejected");
        assert!(matches!(err, ConfigError::LivenessTimeoutTooShort { .. }));
    }

    #[test]
    fn zero_capacity_rejected() {
        let err = Settings::from_toml_str("[relay]\nqueue_capacity = 0\n").expect_err("rejected");
        assert!(matches!(err, ConfigError::Zero("relay.queue_capacity")));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = Settings::from_toml_str("[relay\n").expect_err("bad toml");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hxdbg.toml");
        std::fs::write(&path, "[panel]\nverify_interval_ms = 1000\n").expect("write");

        let settings = Settings::load(&path).expect("load");
        assert_eq!(settings.panel.verify_interval_ms, 1000);
    }
}
