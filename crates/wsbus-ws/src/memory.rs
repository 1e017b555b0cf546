//! In-memory connector for tests.
//!
//! Each accepted open yields a [`MemoryPeer`] playing the server side of
//! that connection: it sees every frame the client writes and can inject
//! frames or drop the connection. Opens can be scripted to fail.
//!
//! Hidden from the documented API; it exists for this crate's tests and for
//! downstream crates testing code built on [`PubSubClient`](crate::PubSubClient).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use wsbus_core::{ClientError, Connector, Message, TransportEvent, TransportHandle};

struct MemoryInner {
    refusals: VecDeque<String>,
    open_times: Vec<Instant>,
    last_protocols: Vec<String>,
}

/// A scriptable [`Connector`] that never touches the network.
pub struct MemoryConnector {
    inner: Mutex<MemoryInner>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryConnector {
    /// Returns the connector and the stream of server-side peers, one per
    /// accepted open.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, peers_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            inner: Mutex::new(MemoryInner {
                refusals: VecDeque::new(),
                open_times: vec![],
                last_protocols: vec![],
            }),
            peers,
        });
        (connector, peers_rx)
    }

    fn inner(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next unscripted open fail with `reason`.
    pub fn refuse_next(&self, reason: impl Into<String>) {
        self.inner().refusals.push_back(reason.into());
    }

    /// Number of open attempts so far, failed ones included.
    pub fn opens(&self) -> usize {
        self.inner().open_times.len()
    }

    /// When each open attempt happened.
    pub fn open_times(&self) -> Vec<Instant> {
        self.inner().open_times.clone()
    }

    /// Sub-protocols offered on the most recent open.
    pub fn last_protocols(&self) -> Vec<String> {
        self.inner().last_protocols.clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, url: &str, protocols: &[String]) -> Result<TransportHandle, ClientError> {
        let refusal = {
            let mut inner = self.inner();
            inner.open_times.push(Instant::now());
            inner.last_protocols = protocols.to_vec();
            inner.refusals.pop_front()
        };
        if let Some(reason) = refusal {
            return Err(ClientError::TransportOpen(format!("{url}: {reason}")));
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            sent: out_rx,
            inject: in_tx,
        };
        self.peers
            .send(peer)
            .map_err(|_| ClientError::TransportOpen("no server listening".into()))?;
        Ok(TransportHandle::new(out_tx, in_rx))
    }
}

/// Server side of one in-memory connection.
pub struct MemoryPeer {
    sent: mpsc::UnboundedReceiver<String>,
    inject: mpsc::UnboundedSender<TransportEvent>,
}

impl MemoryPeer {
    /// Next frame written by the client, decoded. `None` once the client
    /// dropped the connection.
    ///
    /// # Panics
    /// If the client wrote a frame that is not a valid message.
    pub async fn next_frame(&mut self) -> Option<Message> {
        let text = self.sent.recv().await?;
        Some(Message::decode(&text).expect("client wrote an invalid frame"))
    }

    /// A frame the client already wrote, without waiting.
    pub fn try_next_frame(&mut self) -> Option<Message> {
        let text = self.sent.try_recv().ok()?;
        Some(Message::decode(&text).expect("client wrote an invalid frame"))
    }

    /// Deliver a message to the client.
    pub fn push(&self, msg: &Message) {
        let text = msg.encode().expect("message serializes");
        self.push_raw(text);
    }

    /// Deliver an arbitrary text frame, valid or not.
    pub fn push_raw(&self, text: impl Into<String>) {
        let _ = self.inject.send(TransportEvent::Frame(text.into()));
    }

    /// Drop the connection from the server side.
    pub fn disconnect(&self, reason: impl Into<String>) {
        let _ = self.inject.send(TransportEvent::Closed(reason.into()));
    }
}
