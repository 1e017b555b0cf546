//! Connection lifecycle states and the events surfaced to collaborators.

use wsbus_core::Message;

/// Lifecycle state of the client's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Constructed, never connected.
    Disconnected,
    /// A transport open is in flight.
    Connecting,
    /// Transport open, subscriptions replayed, heartbeat running.
    Connected,
    /// Transport lost; waiting out the backoff delay.
    Reconnecting,
    /// Reconnect budget exhausted. A manual `connect()` starts over.
    Failed,
    /// Closed by the caller. Terminal.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Failed => write!(f, "failed"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Events broadcast by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A (re)connect completed and subscriptions were replayed.
    Connected,
    /// An established connection went away.
    Disconnected { reason: String },
    /// Inbound message not claimed by a subscription or pending request.
    Message(Message),
    /// Inbound `error` message not matching any pending request.
    Error(Message),
    /// Reconnect budget exhausted; emitted once per transition to `Failed`.
    MaxReconnectsExceeded { attempts: u32 },
    /// Heartbeat acknowledgment received.
    Pong { id: String },
    /// Every lifecycle transition, in order.
    StateChanged(ConnectionState),
}
