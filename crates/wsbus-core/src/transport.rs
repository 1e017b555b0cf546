//! The `Connector` trait: the seam between the client and the wire.
//!
//! A connector opens one bidirectional text-frame connection and hands back
//! a [`TransportHandle`]: an outbound frame sender plus an inbound event
//! receiver. Dropping the handle (or calling [`TransportHandle::close`])
//! closes the underlying connection.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ClientError;

/// Something observed on an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound text frame.
    Frame(String),
    /// The connection ended. Always the last event.
    Closed(String),
}

/// A live connection, exclusively owned by the connection state machine.
#[derive(Debug)]
pub struct TransportHandle {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportHandle {
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Queue a text frame for writing. Never blocks.
    pub fn send(&self, frame: String) -> Result<(), ClientError> {
        self.outbound
            .send(frame)
            .map_err(|_| ClientError::UnexpectedClose("transport writer gone".into()))
    }

    /// Next inbound event. A dropped writer side reads as `Closed`.
    pub async fn recv(&mut self) -> TransportEvent {
        self.inbound
            .recv()
            .await
            .unwrap_or_else(|| TransportEvent::Closed("transport reader gone".into()))
    }

    /// Close the connection, consuming the handle.
    pub fn close(self) {
        drop(self);
    }
}

/// Opens transports. Implementations must be `Send + Sync` for use across
/// Tokio tasks and are stored as `Arc<dyn Connector>`.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection to `url`, offering `protocols` as sub-protocols.
    async fn open(&self, url: &str, protocols: &[String]) -> Result<TransportHandle, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_peer_reads_as_closed() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let mut handle = TransportHandle::new(out_tx, in_rx);

        handle.send("hello".into()).unwrap();
        assert_eq!(out_rx.recv().await.as_deref(), Some("hello"));

        in_tx.send(TransportEvent::Frame("x".into())).unwrap();
        drop(in_tx);
        assert_eq!(handle.recv().await, TransportEvent::Frame("x".into()));
        assert!(matches!(handle.recv().await, TransportEvent::Closed(_)));
    }

    #[tokio::test]
    async fn send_after_writer_gone_is_unexpected_close() {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (_in_tx, in_rx) = mpsc::unbounded_channel();
        let handle = TransportHandle::new(out_tx, in_rx);
        drop(out_rx);
        let err = handle.send("x".into()).unwrap_err();
        assert!(err.is_retryable());
    }
}
