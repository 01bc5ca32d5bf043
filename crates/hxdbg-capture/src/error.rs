//! Errors raised while capturing.

use hxdbg_core::error::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// The host context the agent lives in is gone (page unloaded,
    /// extension reloaded). Recovery is a delayed reinitialization.
    #[error("extension context invalidated")]
    ContextInvalidated,

    #[error("failed to build descriptor: {0}")]
    Descriptor(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl CaptureError {
    pub fn is_context_invalidated(&self) -> bool {
        matches!(self, Self::ContextInvalidated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hxdbg_core::types::ChannelId;

    #[test]
    fn transport_error_is_transparent() {
        let err = CaptureError::from(TransportError::ChannelClosed(ChannelId(3)));
        assert_eq!(err.to_string(), "channel chan-3 is closed");
        assert!(!err.is_context_invalidated());
    }

    #[test]
    fn context_invalidated_message() {
        let err = CaptureError::ContextInvalidated;
        assert!(err.is_context_invalidated());
        assert!(err.to_string().contains("context invalidated"));
    }
}
