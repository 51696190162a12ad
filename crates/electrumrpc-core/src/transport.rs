//! The `RpcTransport` trait — the seam between the batching core and a live
//! server connection.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// A connection able to exchange JSON-RPC messages with one Electrum server.
///
/// Connection setup (TCP, TLS, proxies) happens before a transport is handed
/// to this crate. Implementations serialize concurrent callers themselves.
///
/// # Object Safety
/// The trait is object-safe and can be stored as `Arc<dyn RpcTransport>`.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send a single JSON-RPC request and return the response.
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// Send a batch of JSON-RPC requests in one round trip.
    ///
    /// Responses may come back in any order; callers match them by id.
    /// Default implementation sends them sequentially; override for true batching.
    async fn send_batch(
        &self,
        reqs: Vec<JsonRpcRequest>,
    ) -> Result<Vec<JsonRpcResponse>, TransportError> {
        let mut responses = Vec::with_capacity(reqs.len());
        for req in reqs {
            responses.push(self.send(req).await?);
        }
        Ok(responses)
    }

    /// Return the transport's identifier (server address or name).
    fn url(&self) -> &str;
}

/// Send `req` and deserialize the result.
///
/// A server-side error object becomes [`TransportError::Rpc`].
pub async fn call<T: DeserializeOwned>(
    transport: &dyn RpcTransport,
    req: JsonRpcRequest,
) -> Result<T, TransportError> {
    let resp = transport.send(req).await?;
    let result = resp.into_result().map_err(TransportError::Rpc)?;
    serde_json::from_value(result).map_err(TransportError::Deserialization)
}
