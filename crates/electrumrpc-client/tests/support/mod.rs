//! Scripted in-memory Electrum server for service tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use electrumrpc_client::{ElectrumRpc, ElectrumRpcConfig};
use electrumrpc_core::error::TransportError;
use electrumrpc_core::policy::RetryConfig;
use electrumrpc_core::progress::{HistoryStatus, ProgressSink};
use electrumrpc_core::request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use electrumrpc_core::transport::RpcTransport;
use serde_json::Value;

type Handler = dyn Fn(&JsonRpcRequest) -> Result<Value, JsonRpcError> + Send + Sync;

pub struct MockServer {
    handler: Box<Handler>,
    failures: Mutex<VecDeque<TransportError>>,
    requests: Mutex<Vec<JsonRpcRequest>>,
    round_trips: Mutex<usize>,
}

impl MockServer {
    pub fn new(
        handler: impl Fn(&JsonRpcRequest) -> Result<Value, JsonRpcError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::failing(Vec::new(), handler)
    }

    /// The first `failures.len()` round trips fail with the given errors.
    pub fn failing(
        failures: Vec<TransportError>,
        handler: impl Fn(&JsonRpcRequest) -> Result<Value, JsonRpcError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            failures: Mutex::new(failures.into()),
            requests: Mutex::new(Vec::new()),
            round_trips: Mutex::new(0),
        })
    }

    /// Every request that reached the handler, in arrival order.
    pub fn requests(&self) -> Vec<JsonRpcRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.method).collect()
    }

    pub fn round_trips(&self) -> usize {
        *self.round_trips.lock().unwrap()
    }

    fn answer(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        let id = req.id_number().unwrap();
        let response = match (self.handler)(&req) {
            Ok(v) => JsonRpcResponse::success(id, v),
            Err(e) => JsonRpcResponse::failure(id, e.code, e.message),
        };
        self.requests.lock().unwrap().push(req);
        response
    }

    fn begin_round_trip(&self) -> Result<(), TransportError> {
        *self.round_trips.lock().unwrap() += 1;
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RpcTransport for MockServer {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        self.begin_round_trip()?;
        Ok(self.answer(req))
    }

    async fn send_batch(
        &self,
        reqs: Vec<JsonRpcRequest>,
    ) -> Result<Vec<JsonRpcResponse>, TransportError> {
        self.begin_round_trip()?;
        // Answer in reverse to exercise id matching.
        Ok(reqs.into_iter().rev().map(|r| self.answer(r)).collect())
    }

    fn url(&self) -> &str {
        "mock://electrum"
    }
}

pub fn rejection(message: &str) -> JsonRpcError {
    JsonRpcError {
        code: 1,
        message: message.into(),
        data: None,
    }
}

/// First positional parameter as a string.
pub fn param0(req: &JsonRpcRequest) -> &str {
    req.params[0].as_str().unwrap_or_default()
}

pub fn fast_config() -> ElectrumRpcConfig {
    ElectrumRpcConfig {
        retry: RetryConfig {
            max_attempts: 5,
            delay: Duration::ZERO,
        },
        ..ElectrumRpcConfig::default()
    }
}

pub fn service(server: &Arc<MockServer>) -> ElectrumRpc {
    ElectrumRpc::new(server.clone(), 0, fast_config())
}

/// Records every status update.
#[derive(Default)]
pub struct RecordingProgress {
    pub updates: Mutex<Vec<HistoryStatus>>,
}

impl ProgressSink for RecordingProgress {
    fn history_status(&self, status: HistoryStatus) {
        self.updates.lock().unwrap().push(status);
    }
}
