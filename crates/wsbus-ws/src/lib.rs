//! wsbus-ws: resilient WebSocket publish/subscribe client.
//!
//! # Features
//! - Auto-reconnect on disconnect (exponential backoff, bounded budget)
//! - Subscription registry replayed in registration order after every reconnect
//! - Heartbeat ping/pong while connected; a missed pong forces a reconnect
//! - Correlated request/response over the same connection
//! - Broadcast event stream (connect, disconnect, message, error, pong, ...)

pub mod client;
#[doc(hidden)]
pub mod memory;
pub mod state;
pub mod subscriptions;
pub mod transport;

mod heartbeat;
mod pending;
mod router;

pub use client::{ClientBuilder, PubSubClient};
#[doc(hidden)]
pub use memory::{MemoryConnector, MemoryPeer};
pub use state::{ClientEvent, ConnectionState};
pub use subscriptions::{Callback, SubscriptionId, SubscriptionInfo, SubscriptionRegistry};
pub use transport::WsConnector;
pub use wsbus_core::{
    ClientConfig, ClientError, Connector, ErrorKind, Message, MessageType, ResourceClass,
    TransportEvent, TransportHandle,
};
