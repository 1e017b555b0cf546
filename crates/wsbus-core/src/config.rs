//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::ReconnectConfig;
use crate::error::ClientError;

/// Resource class of the host the client runs on.
///
/// Resolved by the caller before construction; the client never sniffs it.
/// Heavier classes stretch the heartbeat interval, never shorten it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceClass {
    #[default]
    Standard,
    Mobile,
    LowPower,
}

impl ResourceClass {
    /// Multiplier applied to the base ping interval.
    pub fn interval_multiplier(self) -> u32 {
        match self {
            Self::Standard => 1,
            Self::Mobile => 2,
            Self::LowPower => 4,
        }
    }
}

/// Configuration for a pub/sub client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Endpoint, e.g. `wss://feed.example.com/ws`.
    pub url: String,
    /// Optional `Sec-WebSocket-Protocol` values.
    #[serde(default)]
    pub protocols: Vec<String>,
    /// Base heartbeat interval in milliseconds.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default)]
    pub resource_class: ResourceClass,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Exponential backoff base in milliseconds.
    #[serde(default = "default_base_reconnect_delay_ms")]
    pub base_reconnect_delay_ms: u64,
    /// Cap on a single backoff delay in milliseconds.
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,
    /// Treat an unacknowledged ping as a dead connection.
    #[serde(default = "bool_true")]
    pub reconnect_on_missed_pong: bool,
    /// Optional timeout for correlated requests (no timeout when absent).
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// Capacity of the broadcast event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_ping_interval_ms() -> u64 { 30_000 }
fn default_max_reconnect_attempts() -> u32 { 5 }
fn default_base_reconnect_delay_ms() -> u64 { 1_000 }
fn default_max_reconnect_delay_ms() -> u64 { 30_000 }
fn default_event_capacity() -> usize { 256 }
fn bool_true() -> bool { true }

impl ClientConfig {
    /// Defaults for everything but the endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocols: vec![],
            ping_interval_ms: default_ping_interval_ms(),
            resource_class: ResourceClass::Standard,
            max_reconnect_attempts: default_max_reconnect_attempts(),
            base_reconnect_delay_ms: default_base_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            reconnect_on_missed_pong: true,
            request_timeout_ms: None,
            event_capacity: default_event_capacity(),
        }
    }

    /// Parse a JSON config document.
    pub fn from_json_str(s: &str) -> Result<Self, ClientError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Heartbeat interval after applying the resource class.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms) * self.resource_class.interval_multiplier()
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Backoff parameters derived from this config.
    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: self.max_reconnect_attempts,
            base_delay: Duration::from_millis(self.base_reconnect_delay_ms),
            max_delay: Duration::from_millis(self.max_reconnect_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_minimal_json() {
        let cfg = ClientConfig::from_json_str(r#"{"url":"ws://localhost:9000"}"#).unwrap();
        assert_eq!(cfg.ping_interval(), Duration::from_secs(30));
        assert_eq!(cfg.max_reconnect_attempts, 5);
        assert_eq!(cfg.base_reconnect_delay_ms, 1_000);
        assert!(cfg.reconnect_on_missed_pong);
        assert!(cfg.request_timeout().is_none());
        assert!(cfg.protocols.is_empty());
    }

    #[test]
    fn camel_case_keys() {
        let cfg = ClientConfig::from_json_str(
            r#"{
                "url": "wss://feed",
                "protocols": ["v1.feed"],
                "pingIntervalMs": 10000,
                "maxReconnectAttempts": 2,
                "baseReconnectDelayMs": 10,
                "resourceClass": "lowPower",
                "requestTimeoutMs": 500
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.protocols, vec!["v1.feed".to_string()]);
        assert_eq!(cfg.max_reconnect_attempts, 2);
        assert_eq!(cfg.reconnect().base_delay, Duration::from_millis(10));
        assert_eq!(cfg.request_timeout(), Some(Duration::from_millis(500)));
        assert_eq!(cfg.ping_interval(), Duration::from_secs(40));
    }

    #[test]
    fn resource_class_never_shortens_interval() {
        let mut cfg = ClientConfig::new("ws://x");
        for class in [ResourceClass::Standard, ResourceClass::Mobile, ResourceClass::LowPower] {
            cfg.resource_class = class;
            assert!(cfg.ping_interval() >= Duration::from_millis(cfg.ping_interval_ms));
        }
    }

    #[test]
    fn missing_url_is_rejected() {
        assert!(ClientConfig::from_json_str("{}").is_err());
    }
}
