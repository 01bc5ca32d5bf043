//! Panel channel seam between the coordinator and the transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use hxdbg_core::error::TransportError;
use hxdbg_core::types::{ChannelId, PanelMessage};

/// Send half of a long-lived panel channel.
///
/// Identity is the [`ChannelId`]: the registry removes a subscription by
/// comparing ids, never by comparing handles.
pub trait PanelChannel {
    fn id(&self) -> ChannelId;

    /// Deliver one message. An error means the channel is gone.
    fn post(&self, message: &PanelMessage) -> Result<(), TransportError>;
}

/// In-memory channel: records every posted message until closed.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    id: ChannelId,
    inbox: Arc<Mutex<Vec<PanelMessage>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryChannel {
    pub fn new(id: u64) -> Self {
        Self {
            id: ChannelId(id),
            inbox: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Snapshot of everything delivered so far.
    pub fn messages(&self) -> Vec<PanelMessage> {
        self.inbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn heartbeat_count(&self) -> usize {
        self.messages()
            .iter()
            .filter(|m| matches!(m, PanelMessage::Heartbeat))
            .count()
    }
}

impl PanelChannel for MemoryChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn post(&self, message: &PanelMessage) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::ChannelClosed(self.id));
        }
        self.inbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.clone());
        Ok(())
    }
}
