//! One-shot acknowledgement callback carried with every submission.

use std::fmt;

use hxdbg_core::types::Ack;

type AckFn = Box<dyn FnOnce(Ack) + Send>;

/// Fires its callback at most once. A handle dropped without an explicit
/// [`ReplyHandle::ack`] acknowledges with [`Ack::DROPPED`], so a submitter
/// awaiting a response is never left hanging.
pub struct ReplyHandle {
    callback: Option<AckFn>,
}

impl ReplyHandle {
    pub fn new(callback: impl FnOnce(Ack) + Send + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// Handle for fire-and-forget senders.
    pub fn noop() -> Self {
        Self { callback: None }
    }

    pub fn ack(mut self, ack: Ack) {
        if let Some(callback) = self.callback.take() {
            callback(ack);
        }
    }
}

impl Drop for ReplyHandle {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(Ack::DROPPED);
        }
    }
}

impl fmt::Debug for ReplyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyHandle")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}
