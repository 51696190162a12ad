//! Newline-delimited JSON-RPC over an already established byte stream.
//!
//! Electrum servers speak one JSON document per line: a request object or a
//! batch array goes out, the matching response object or array comes back,
//! possibly preceded by push notifications. The transport owns the stream
//! behind an async mutex so one exchange completes before the next starts.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{
    split, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};
use tokio::sync::Mutex;
use tokio::time;

use electrumrpc_core::error::TransportError;
use electrumrpc_core::request::{JsonRpcRequest, JsonRpcResponse};
use electrumrpc_core::transport::RpcTransport;

use crate::notifications::{Notification, NotificationRouter};

/// Configuration for [`LineTransport`].
#[derive(Debug, Clone)]
pub struct LineTransportConfig {
    /// How long to wait for the answer to one request or batch.
    pub response_timeout: Duration,
}

impl Default for LineTransportConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(30),
        }
    }
}

struct Connection<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
}

impl<S: AsyncRead + AsyncWrite> Connection<S> {
    fn new(stream: S) -> Self {
        let (reader, writer) = split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Write `payload` as one line, then read lines until one answers `ids`.
    async fn exchange(
        &mut self,
        payload: &str,
        ids: &HashSet<u64>,
        router: &NotificationRouter,
    ) -> Result<Value, TransportError> {
        self.writer.write_all(payload.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Err(TransportError::Closed);
            }
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            let message = match serde_json::from_str::<Value>(text) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, "discarding malformed line from server");
                    continue;
                }
            };
            if let Some(answer) = classify(message, ids, router) {
                return Ok(answer);
            }
        }
    }
}

/// Returns the message if it answers one of `ids`; routes notifications.
fn classify(message: Value, ids: &HashSet<u64>, router: &NotificationRouter) -> Option<Value> {
    let keep = match &message {
        Value::Array(items) => {
            let ours = items.iter().any(|item| answers(item, ids));
            if !ours {
                tracing::debug!(items = items.len(), "skipping batch response for other requests");
            }
            ours
        }
        Value::Object(obj) => {
            let id = obj.get("id").filter(|id| !id.is_null());
            match (obj.get("method").and_then(Value::as_str), id) {
                (Some(method), None) => {
                    let notification = Notification {
                        method: method.to_string(),
                        params: obj.get("params").cloned().unwrap_or(Value::Null),
                    };
                    if !router.dispatch(notification) {
                        tracing::debug!(method, "no listener for notification");
                    }
                    false
                }
                // A rejection of the whole message (e.g. an oversized batch)
                // cannot carry an id.
                (None, None) => obj.contains_key("error"),
                _ if answers(&message, ids) => true,
                _ => {
                    tracing::debug!("skipping response for another request");
                    false
                }
            }
        }
        _ => {
            tracing::warn!("discarding non-object message from server");
            false
        }
    };
    keep.then_some(message)
}

fn answers(item: &Value, ids: &HashSet<u64>) -> bool {
    let id = match item.get("id") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    id.is_some_and(|id| ids.contains(&id))
}

/// JSON-RPC transport over a line-oriented byte stream (TCP, TLS, or any
/// other `AsyncRead + AsyncWrite`).
///
/// A transport may be created before its stream exists; until
/// [`attach`](Self::attach) is called every request fails with
/// [`TransportError::NotReady`], which the retry policy treats as transient.
/// The same happens after the stream breaks or an exchange times out, until a
/// new one is attached.
pub struct LineTransport<S> {
    label: String,
    config: LineTransportConfig,
    conn: Mutex<Option<Connection<S>>>,
    notifications: NotificationRouter,
}

impl<S> LineTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Wrap a connected stream.
    pub fn new(label: impl Into<String>, stream: S, config: LineTransportConfig) -> Self {
        Self {
            label: label.into(),
            config,
            conn: Mutex::new(Some(Connection::new(stream))),
            notifications: NotificationRouter::new(),
        }
    }

    /// A transport whose stream will be attached later.
    pub fn pending(label: impl Into<String>, config: LineTransportConfig) -> Self {
        Self {
            label: label.into(),
            config,
            conn: Mutex::new(None),
            notifications: NotificationRouter::new(),
        }
    }

    /// Install (or replace) the underlying stream.
    pub async fn attach(&self, stream: S) {
        *self.conn.lock().await = Some(Connection::new(stream));
        tracing::info!(server = %self.label, "transport attached");
    }

    pub async fn is_ready(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// Router for server push notifications seen while awaiting responses.
    pub fn notifications(&self) -> &NotificationRouter {
        &self.notifications
    }

    async fn exchange(&self, payload: String, ids: HashSet<u64>) -> Result<Value, TransportError> {
        let mut guard = self.conn.lock().await;
        let Some(conn) = guard.as_mut() else {
            return Err(TransportError::NotReady(format!("{} is not connected", self.label)));
        };

        let timeout = self.config.response_timeout;
        let exchange = conn.exchange(&payload, &ids, &self.notifications);
        let result = match time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                ms: timeout.as_millis() as u64,
            }),
        };
        match result {
            // A cancelled exchange may have left a partial line on the wire.
            Err(
                e @ (TransportError::Closed
                | TransportError::Io(_)
                | TransportError::Timeout { .. }),
            ) => {
                tracing::warn!(server = %self.label, error = %e, "dropping connection");
                *guard = None;
                Err(e)
            }
            other => other,
        }
    }
}

#[async_trait]
impl<S> RpcTransport for LineTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let ids = req.id_number().into_iter().collect();
        let payload = serde_json::to_string(&req)?;
        let answer = self.exchange(payload, ids).await?;
        Ok(serde_json::from_value(answer)?)
    }

    async fn send_batch(
        &self,
        reqs: Vec<JsonRpcRequest>,
    ) -> Result<Vec<JsonRpcResponse>, TransportError> {
        if reqs.is_empty() {
            return Ok(vec![]);
        }
        let ids = reqs.iter().filter_map(JsonRpcRequest::id_number).collect();
        let payload = serde_json::to_string(&reqs)?;

        match self.exchange(payload, ids).await? {
            answer @ Value::Array(_) => Ok(serde_json::from_value(answer)?),
            answer => {
                let resp: JsonRpcResponse = serde_json::from_value(answer)?;
                match resp.error {
                    Some(err) => Err(TransportError::Rpc(err)),
                    None => Ok(vec![resp]),
                }
            }
        }
    }

    fn url(&self) -> &str {
        &self.label
    }
}
