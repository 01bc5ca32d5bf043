//! Error taxonomy shared across the relay pipeline.

use thiserror::Error;

use crate::types::ChannelId;

/// Send failed or the channel is gone. Recovered locally by the caller
/// (connection flag flip, bounded retry, or subscription purge).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel {0} is closed")]
    ChannelClosed(ChannelId),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("transport io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Failure while processing one queued entry. Never aborts the drain loop.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("record has an empty kind")]
    EmptyKind,

    #[error("malformed {kind} record: {reason}")]
    MalformedRecord { kind: String, reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("liveness timeout ({timeout_ms}ms) must exceed the liveness period ({period_ms}ms)")]
    LivenessTimeoutTooShort { timeout_ms: u64, period_ms: u64 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_error_display() {
        let err = RelayError::MalformedRecord {
            kind: "HTMX_EVENT".to_owned(),
            reason: "missing data".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("HTMX_EVENT"));
        assert!(msg.contains("missing data"));
    }

    #[test]
    fn transport_error_is_transparent_in_relay_error() {
        let err: RelayError = TransportError::ChannelClosed(ChannelId(9)).into();
        assert_eq!(err.to_string(), "channel chan-9 is closed");
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::LivenessTimeoutTooShort {
            timeout_ms: 5000,
            period_ms: 5000,
        };
        assert!(err.to_string().contains("must exceed"));
    }
}
