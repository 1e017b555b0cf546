//! Client error taxonomy.

use serde_json::Value;
use thiserror::Error;

/// Coarse classification of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Opening the transport failed.
    TransportOpen,
    /// An established transport went away without `close()` being called.
    UnexpectedClose,
    /// An inbound frame could not be decoded.
    Decode,
    /// An outbound message could not be serialized.
    Encode,
    /// The operation requires a connected client.
    NotConnected,
    /// The reconnect budget is exhausted.
    MaxReconnectsExceeded,
    /// The server answered a request with an `error` message.
    RequestFailure,
    /// The client was closed, or the connection carrying the request was torn down.
    Closed,
    /// A request did not complete within the configured timeout.
    Timeout,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TransportOpen => "transport_open",
            Self::UnexpectedClose => "unexpected_close",
            Self::Decode => "decode",
            Self::Encode => "encode",
            Self::NotConnected => "not_connected",
            Self::MaxReconnectsExceeded => "max_reconnects_exceeded",
            Self::RequestFailure => "request_failure",
            Self::Closed => "closed",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by the pub/sub client.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The transport could not be opened (DNS, refused, handshake, ...).
    #[error("failed to open transport: {0}")]
    TransportOpen(String),

    /// The transport closed or errored underneath us.
    #[error("connection closed unexpectedly: {0}")]
    UnexpectedClose(String),

    /// A frame was not a valid wire message.
    #[error("failed to decode frame: {0}")]
    Decode(String),

    /// An outbound message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// `send`/`request` called while not connected.
    #[error("client is not connected")]
    NotConnected,

    /// Reconnect attempts exhausted; a manual `connect()` is required.
    #[error("gave up after {attempts} reconnect attempts")]
    MaxReconnectsExceeded { attempts: u32 },

    /// Server-side error for a correlated request.
    #[error("request {id} failed: {data}")]
    RequestFailure { id: String, data: Value },

    /// Client closed.
    #[error("client closed")]
    Closed,

    /// Request timed out after the configured duration.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },
}

impl ClientError {
    /// The [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TransportOpen(_) => ErrorKind::TransportOpen,
            Self::UnexpectedClose(_) => ErrorKind::UnexpectedClose,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Encode(_) => ErrorKind::Encode,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::MaxReconnectsExceeded { .. } => ErrorKind::MaxReconnectsExceeded,
            Self::RequestFailure { .. } => ErrorKind::RequestFailure,
            Self::Closed => ErrorKind::Closed,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Returns `true` if this error counts toward the reconnect budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportOpen(_) | Self::UnexpectedClose(_))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(ClientError::TransportOpen("refused".into()).is_retryable());
        assert!(ClientError::UnexpectedClose("eof".into()).is_retryable());
        assert!(!ClientError::Decode("bad".into()).is_retryable());
        assert!(!ClientError::Encode("bad".into()).is_retryable());
        assert!(!ClientError::NotConnected.is_retryable());
        assert!(!ClientError::Closed.is_retryable());
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(ClientError::NotConnected.kind(), ErrorKind::NotConnected);
        assert_eq!(
            ClientError::MaxReconnectsExceeded { attempts: 2 }.kind(),
            ErrorKind::MaxReconnectsExceeded
        );
        assert_eq!(ClientError::Timeout { ms: 10 }.to_string(), "request timed out after 10ms");
        assert_eq!(ClientError::Encode("x".into()).kind(), ErrorKind::Encode);
        assert_ne!(ErrorKind::Encode, ErrorKind::Decode);
    }

    #[test]
    fn json_errors_are_inbound_decode_failures() {
        let err: ClientError = serde_json::from_str::<Value>("{").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }
}
