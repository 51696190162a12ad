//! Operation-level errors surfaced to callers of [`ElectrumRpc`](crate::ElectrumRpc).

use electrumrpc_core::batch::EntryError;
use electrumrpc_core::error::TransportError;
use thiserror::Error;

/// A failed Electrum operation.
///
/// The message names the operation and, for batched operations, the keys
/// that could not be resolved.
#[derive(Debug, Error)]
pub enum ServerRpcError {
    /// A single call failed after retries, or was rejected by the server.
    #[error("{context}")]
    Call {
        context: String,
        #[source]
        source: TransportError,
    },

    /// A batched operation could not tolerate the keys that failed.
    /// `failures` holds each failed key, in key order, with its error.
    #[error("{context}")]
    Batch {
        context: String,
        failures: Vec<(String, EntryError)>,
    },

    /// The server refused a broadcast; `message` is its reason, verbatim.
    #[error("{message}")]
    Rejected { message: String, code: i64 },
}

impl ServerRpcError {
    pub(crate) fn call(context: impl Into<String>, source: TransportError) -> Self {
        Self::Call {
            context: context.into(),
            source,
        }
    }

    /// Failed keys and their errors. Empty unless this is a batch error.
    pub fn failures(&self) -> &[(String, EntryError)] {
        match self {
            Self::Batch { failures, .. } => failures,
            _ => &[],
        }
    }

    /// The keys a batched operation could not resolve.
    pub fn failed_keys(&self) -> Vec<&str> {
        self.failures().iter().map(|(key, _)| key.as_str()).collect()
    }
}
