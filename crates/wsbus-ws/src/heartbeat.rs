//! Heartbeat monitor.
//!
//! Runs only while connected. Each tick sends a `ping` with a fresh id; the
//! matching `pong` clears the outstanding probe. A tick that finds the
//! previous probe still unacknowledged reports [`Beat::Missed`] when
//! `reconnect_on_miss` is set.

use std::time::Duration;

use tokio::time::Instant;

use wsbus_core::Message;

/// What the driver should do on a heartbeat tick.
#[derive(Debug, PartialEq)]
pub(crate) enum Beat {
    /// Send this probe.
    Probe(Message),
    /// The previous probe was never acknowledged.
    Missed,
}

pub(crate) struct HeartbeatMonitor {
    interval: Duration,
    reconnect_on_miss: bool,
    next_tick: Option<Instant>,
    outstanding: Option<String>,
    seq: u64,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration, reconnect_on_miss: bool) -> Self {
        Self {
            interval,
            reconnect_on_miss,
            next_tick: None,
            outstanding: None,
            seq: 0,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.next_tick = Some(now + self.interval);
        self.outstanding = None;
    }

    pub fn stop(&mut self) {
        self.next_tick = None;
        self.outstanding = None;
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    /// When the next tick is due, if running.
    pub fn deadline(&self) -> Option<Instant> {
        self.next_tick
    }

    pub fn on_tick(&mut self, now: Instant) -> Beat {
        if let Some(id) = &self.outstanding {
            if self.reconnect_on_miss {
                tracing::warn!(ping = %id, "heartbeat acknowledgment missed");
                self.stop();
                return Beat::Missed;
            }
            tracing::debug!(ping = %id, "heartbeat acknowledgment missed, probing again");
        }
        self.seq += 1;
        let id = format!("ping-{}", self.seq);
        self.outstanding = Some(id.clone());
        self.next_tick = Some(now + self.interval);
        Beat::Probe(Message::ping(id))
    }

    /// Record a `pong`. Any pong proves liveness; returns `true` if it
    /// matched the outstanding probe.
    pub fn on_pong(&mut self, id: &str) -> bool {
        let matched = self.outstanding.as_deref() == Some(id);
        self.outstanding = None;
        matched
    }

    /// Answer a server-initiated `ping`.
    pub fn reply(&self, ping: &Message) -> Message {
        Message::pong(ping.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wsbus_core::MessageType;

    fn probe_id(beat: Beat) -> String {
        match beat {
            Beat::Probe(msg) => {
                assert_eq!(msg.kind, MessageType::Ping);
                msg.id
            }
            Beat::Missed => panic!("expected a probe"),
        }
    }

    #[test]
    fn stopped_monitor_has_no_deadline() {
        let mut hb = HeartbeatMonitor::new(Duration::from_secs(30), true);
        assert!(hb.deadline().is_none());
        let now = Instant::now();
        hb.start(now);
        assert_eq!(hb.deadline(), Some(now + Duration::from_secs(30)));
        hb.stop();
        assert!(!hb.is_running());
    }

    #[test]
    fn acknowledged_probes_keep_going() {
        let mut hb = HeartbeatMonitor::new(Duration::from_secs(1), true);
        let now = Instant::now();
        hb.start(now);
        let first = probe_id(hb.on_tick(now));
        assert!(hb.on_pong(&first));
        let second = probe_id(hb.on_tick(now + Duration::from_secs(1)));
        assert_ne!(first, second);
        assert_eq!(hb.deadline(), Some(now + Duration::from_secs(2)));
    }

    #[test]
    fn missed_ack_reports_missed_and_stops() {
        let mut hb = HeartbeatMonitor::new(Duration::from_secs(1), true);
        let now = Instant::now();
        hb.start(now);
        probe_id(hb.on_tick(now));
        assert_eq!(hb.on_tick(now + Duration::from_secs(1)), Beat::Missed);
        assert!(!hb.is_running());
    }

    #[test]
    fn missed_ack_tolerated_when_disabled() {
        let mut hb = HeartbeatMonitor::new(Duration::from_secs(1), false);
        let now = Instant::now();
        hb.start(now);
        probe_id(hb.on_tick(now));
        probe_id(hb.on_tick(now + Duration::from_secs(1)));
        assert!(hb.is_running());
    }

    #[test]
    fn server_ping_gets_matching_pong() {
        let hb = HeartbeatMonitor::new(Duration::from_secs(1), true);
        let reply = hb.reply(&Message::ping("srv-7"));
        assert_eq!(reply, Message::pong("srv-7"));
    }
}
