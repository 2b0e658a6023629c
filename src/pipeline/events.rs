//! Outbound side of a connection.

use crate::error::{Result, VocaliveError};
use crate::server::protocol::{OutboundFrame, ServerEvent};
use tokio::sync::mpsc;

/// Queues frames for the socket writer.
///
/// Sends fail with `ConnectionClosed` once the writer has gone away, which is
/// how a turn notices a dead client.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self { tx }
    }

    /// Sender plus the receiving end for the writer.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn send(&self, event: ServerEvent) -> Result<()> {
        self.push(OutboundFrame::Event(event))
    }

    /// Raw PCM for the client, sent as a binary frame.
    pub fn audio(&self, chunk: Vec<u8>) -> Result<()> {
        self.push(OutboundFrame::Audio(chunk))
    }

    pub fn error(&self, message: impl Into<String>) -> Result<()> {
        self.send(ServerEvent::Error {
            message: message.into(),
        })
    }

    /// Ask the writer to close the socket after pending frames.
    pub fn close(&self) -> Result<()> {
        self.push(OutboundFrame::Close)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn push(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| VocaliveError::ConnectionClosed)
    }
}
