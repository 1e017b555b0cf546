//! Subscription registry.
//!
//! Tracks subscriber intent in registration order and replays it after
//! every successful (re)connect. Owned by the connection driver, so it
//! needs no internal locking.

use std::borrow::Borrow;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::SystemTime;

use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use wsbus_core::Message;

/// Callback invoked with the payload of each delivery.
pub type Callback = Arc<dyn Fn(Value) + Send + Sync>;

/// Opaque, client-generated subscription id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    /// A fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for SubscriptionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of a registered subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub topic: String,
    pub created_at: SystemTime,
}

struct SubscriptionEntry {
    topic: String,
    callback: Callback,
    created_at: SystemTime,
}

/// Insertion-ordered map of subscription id → (topic, callback).
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: IndexMap<SubscriptionId, SubscriptionEntry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a subscription and return the subscribe message announcing it.
    pub fn insert(&mut self, id: SubscriptionId, topic: String, callback: Callback) -> Message {
        let msg = Message::subscribe(id.as_str(), &topic);
        self.entries.insert(
            id,
            SubscriptionEntry {
                topic,
                callback,
                created_at: SystemTime::now(),
            },
        );
        msg
    }

    /// Remove a subscription. Returns the unsubscribe message, or `None`
    /// for an unknown id.
    pub fn remove(&mut self, id: &str) -> Option<Message> {
        self.entries
            .shift_remove(id)
            .map(|entry| Message::unsubscribe(id, &entry.topic))
    }

    /// One subscribe message per entry, in registration order.
    pub fn replay(&self) -> Vec<Message> {
        self.entries
            .iter()
            .map(|(id, entry)| Message::subscribe(id.as_str(), &entry.topic))
            .collect()
    }

    /// Forward a delivery to its subscriber. Returns `false` when the id is
    /// unknown (stale or never registered).
    pub fn dispatch(&self, id: &str, payload: Value) -> bool {
        let Some(entry) = self.entries.get(id) else {
            return false;
        };
        let callback = Arc::clone(&entry.callback);
        if catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
            tracing::error!(subscription = %id, topic = %entry.topic, "subscriber callback panicked");
        }
        true
    }

    pub fn snapshot(&self) -> Vec<SubscriptionInfo> {
        self.entries
            .iter()
            .map(|(id, e)| SubscriptionInfo {
                id: id.clone(),
                topic: e.topic.clone(),
                created_at: e.created_at,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no active subscriptions.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Wrap an unbounded sender as a [`Callback`].
pub fn channel_callback() -> (Callback, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel::<Value>();
    let callback: Callback = Arc::new(move |payload: Value| {
        let _ = tx.send(payload);
    });
    (callback, rx)
}
