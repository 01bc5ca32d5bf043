//! Socket-backed panel channel.
//!
//! The coordinator posts into an unbounded queue; the connection task that
//! owns the receiving end writes each message to the socket as one JSON
//! line. Once that task exits the queue is closed and every later post
//! fails, which is how the coordinator learns the panel is gone.

use tokio::sync::mpsc;

use hxdbg_core::error::TransportError;
use hxdbg_core::types::{ChannelId, PanelMessage};
use hxdbg_relay::PanelChannel;

#[derive(Debug, Clone)]
pub struct SocketChannel {
    id: ChannelId,
    outbox: mpsc::UnboundedSender<PanelMessage>,
}

impl SocketChannel {
    pub fn new(id: ChannelId) -> (Self, mpsc::UnboundedReceiver<PanelMessage>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        (Self { id, outbox }, rx)
    }
}

impl PanelChannel for SocketChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn post(&self, message: &PanelMessage) -> Result<(), TransportError> {
        self.outbox
            .send(message.clone())
            .map_err(|_| TransportError::ChannelClosed(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn post_fails_once_receiver_is_gone() {
        let (chan, mut rx) = SocketChannel::new(ChannelId(9));
        chan.post(&PanelMessage::Heartbeat).expect("open");
        assert_eq!(rx.recv().await, Some(PanelMessage::Heartbeat));

        drop(rx);
        let err = chan.post(&PanelMessage::Heartbeat).expect_err("closed");
        assert!(matches!(err, TransportError::ChannelClosed(ChannelId(9))));
    }
}
