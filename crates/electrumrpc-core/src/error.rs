//! Transport-level error types.

use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors that can occur while exchanging JSON-RPC messages with a server.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection cannot serve a request yet (still handshaking,
    /// reconnecting, or otherwise busy). Retried by [`RetryPolicy`].
    ///
    /// [`RetryPolicy`]: crate::policy::RetryPolicy
    #[error("connection not ready: {0}")]
    NotReady(String),

    /// Reading from or writing to the connection failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The server closed the connection.
    #[error("connection closed by server")]
    Closed,

    /// JSON-RPC protocol-level error returned by the server.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// No response arrived within the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl TransportError {
    /// Returns `true` if this error is transient and the request may be sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady(_))
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
