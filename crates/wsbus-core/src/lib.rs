//! wsbus-core: foundation types for the wsbus pub/sub client.
//!
//! # Overview
//!
//! wsbus is a resilient publish/subscribe client that keeps a persistent
//! WebSocket connection alive and replays subscriptions after reconnects.
//! The core crate defines:
//!
//! - [`Message`] / [`MessageType`]: wire types
//! - [`ClientError`] / [`ErrorKind`]: structured error taxonomy
//! - [`ClientConfig`]: serde-loadable configuration
//! - [`backoff`] module: exponential reconnect policy
//! - [`Connector`]: the transport seam every connection implementation uses

pub mod backoff;
pub mod config;
pub mod error;
pub mod message;
pub mod transport;

pub use backoff::{ReconnectConfig, ReconnectPolicy, ReconnectState};
pub use config::{ClientConfig, ResourceClass};
pub use error::{ClientError, ErrorKind, Result};
pub use message::{Message, MessageType};
pub use transport::{Connector, TransportEvent, TransportHandle};
