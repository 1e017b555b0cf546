//! Inbound message router.
//!
//! Decodes one frame and hands it to whichever component owns its type.
//! Undecodable frames are logged and dropped; they never affect the
//! connection.

use tokio::sync::broadcast;

use wsbus_core::{Message, MessageType};

use crate::heartbeat::HeartbeatMonitor;
use crate::pending::PendingRequests;
use crate::state::ClientEvent;
use crate::subscriptions::SubscriptionRegistry;

pub(crate) struct Router<'a> {
    pub registry: &'a SubscriptionRegistry,
    pub pending: &'a mut PendingRequests,
    pub heartbeat: &'a mut HeartbeatMonitor,
    pub events: &'a broadcast::Sender<ClientEvent>,
}

impl Router<'_> {
    /// Route one inbound frame. Returns a frame to send back, if any.
    pub fn route(&mut self, frame: &str) -> Option<Message> {
        let msg = match Message::decode(frame) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = %e, len = frame.len(), "dropping undecodable frame");
                return None;
            }
        };

        match msg.kind {
            MessageType::Subscription => {
                if !self.registry.dispatch(&msg.id, msg.data) {
                    tracing::debug!(subscription = %msg.id, "delivery for unknown subscription dropped");
                }
            }
            MessageType::Response => {
                if !self.pending.resolve(&msg.id, msg.data.clone()) {
                    self.emit(ClientEvent::Message(msg));
                }
            }
            MessageType::Error => {
                if !self.pending.reject(&msg.id, msg.data.clone()) {
                    self.emit(ClientEvent::Error(msg));
                }
            }
            MessageType::Ping => return Some(self.heartbeat.reply(&msg)),
            MessageType::Pong => {
                self.heartbeat.on_pong(&msg.id);
                self.emit(ClientEvent::Pong { id: msg.id });
            }
            MessageType::Subscribe | MessageType::Unsubscribe | MessageType::Request => {
                self.emit(ClientEvent::Message(msg));
            }
        }
        None
    }

    fn emit(&self, event: ClientEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::oneshot;
    use tokio::time::Instant;

    use crate::subscriptions::channel_callback;

    struct Fixture {
        registry: SubscriptionRegistry,
        pending: PendingRequests,
        heartbeat: HeartbeatMonitor,
        events: broadcast::Sender<ClientEvent>,
        rx: broadcast::Receiver<ClientEvent>,
    }

    impl Fixture {
        fn new() -> Self {
            let (events, rx) = broadcast::channel(16);
            Self {
                registry: SubscriptionRegistry::new(),
                pending: PendingRequests::default(),
                heartbeat: HeartbeatMonitor::new(Duration::from_secs(30), true),
                events,
                rx,
            }
        }

        fn route(&mut self, frame: &str) -> Option<Message> {
            Router {
                registry: &self.registry,
                pending: &mut self.pending,
                heartbeat: &mut self.heartbeat,
                events: &self.events,
            }
            .route(frame)
        }
    }

    #[test]
    fn subscription_goes_to_callback() {
        let mut fx = Fixture::new();
        let (cb, mut rx) = channel_callback();
        fx.registry.insert("s1".into(), "prices".into(), cb);

        fx.route(r#"{"type":"subscription","id":"s1","data":{"px":3}}"#);
        assert_eq!(rx.try_recv().unwrap(), json!({"px": 3}));
        assert!(fx.rx.try_recv().is_err());
    }

    #[test]
    fn stale_subscription_dropped_silently() {
        let mut fx = Fixture::new();
        assert!(fx.route(r#"{"type":"subscription","id":"gone","data":1}"#).is_none());
        assert!(fx.rx.try_recv().is_err());
    }

    #[test]
    fn response_resolves_pending() {
        let mut fx = Fixture::new();
        let (tx, mut rx) = oneshot::channel();
        fx.pending.insert("r1".into(), tx);

        fx.route(r#"{"type":"response","id":"r1","data":{"ok":true}}"#);
        assert_eq!(rx.try_recv().unwrap().unwrap(), json!({"ok": true}));
        assert!(fx.rx.try_recv().is_err());
    }

    #[test]
    fn unmatched_response_and_error_become_events() {
        let mut fx = Fixture::new();
        fx.route(r#"{"type":"response","id":"late","data":1}"#);
        fx.route(r#"{"type":"error","id":"late","data":"boom"}"#);

        assert!(matches!(fx.rx.try_recv().unwrap(), ClientEvent::Message(m) if m.id == "late"));
        assert!(matches!(fx.rx.try_recv().unwrap(), ClientEvent::Error(m) if m.data == json!("boom")));
    }

    #[test]
    fn error_fails_pending() {
        let mut fx = Fixture::new();
        let (tx, mut rx) = oneshot::channel();
        fx.pending.insert("r1".into(), tx);
        fx.route(r#"{"type":"error","id":"r1","data":{"reason":"denied"}}"#);

        let err = rx.try_recv().unwrap().unwrap_err();
        assert_eq!(err.kind(), wsbus_core::ErrorKind::RequestFailure);
    }

    #[test]
    fn ping_answered_pong_surfaced() {
        let mut fx = Fixture::new();
        let reply = fx.route(r#"{"type":"ping","id":"srv-1"}"#).unwrap();
        assert_eq!(reply, Message::pong("srv-1"));
        assert!(fx.rx.try_recv().is_err());

        fx.heartbeat.start(Instant::now());
        fx.heartbeat.on_tick(Instant::now());
        fx.route(r#"{"type":"pong","id":"ping-1"}"#);
        assert_eq!(fx.rx.try_recv().unwrap(), ClientEvent::Pong { id: "ping-1".into() });
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let mut fx = Fixture::new();
        for frame in ["", "{", "[1,2]", r#"{"type":"nope","id":"1"}"#, r#"{"id":"1"}"#] {
            assert!(fx.route(frame).is_none());
        }
        assert!(fx.rx.try_recv().is_err());
    }
}
