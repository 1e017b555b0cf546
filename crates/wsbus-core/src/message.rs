//! Wire message types.
//!
//! Every frame is a UTF-8 JSON object:
//!
//! ```text
//! { "type": "subscribe", "id": "6f1c…", "data": { "topic": "prices" } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ClientError;

/// The `type` discriminator of a wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Subscribe,
    Unsubscribe,
    Subscription,
    Response,
    Error,
    Ping,
    Pong,
    /// Outbound correlated request, answered by `response` or `error`.
    Request,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Subscription => "subscription",
            Self::Response => "response",
            Self::Error => "error",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Request => "request",
        };
        f.write_str(s)
    }
}

/// A single wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub id: String,
    #[serde(default)]
    pub data: Value,
}

impl Message {
    pub fn new(kind: MessageType, id: impl Into<String>, data: Value) -> Self {
        Self {
            kind,
            id: id.into(),
            data,
        }
    }

    pub fn subscribe(id: impl Into<String>, topic: &str) -> Self {
        Self::new(MessageType::Subscribe, id, json!({ "topic": topic }))
    }

    pub fn unsubscribe(id: impl Into<String>, topic: &str) -> Self {
        Self::new(MessageType::Unsubscribe, id, json!({ "topic": topic }))
    }

    pub fn request(id: impl Into<String>, data: Value) -> Self {
        Self::new(MessageType::Request, id, data)
    }

    pub fn ping(id: impl Into<String>) -> Self {
        Self::new(MessageType::Ping, id, Value::Null)
    }

    pub fn pong(id: impl Into<String>) -> Self {
        Self::new(MessageType::Pong, id, Value::Null)
    }

    /// The `data.topic` field of a subscribe/unsubscribe message.
    pub fn topic(&self) -> Option<&str> {
        self.data.get("topic").and_then(Value::as_str)
    }

    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, ClientError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> Result<String, ClientError> {
        serde_json::to_string(self).map_err(|e| ClientError::Encode(e.to_string()))
    }
}
