//! `ElectrumRpc`: the Electrum operation surface.
//!
//! Single-value operations go through the retry policy directly. Batched
//! operations go through a [`BatchPager`] and then through the
//! [`PartialFailurePolicy`] that fits what the caller does with the result.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use electrumrpc_core::batch::{BatchFailure, BatchPager};
use electrumrpc_core::error::TransportError;
use electrumrpc_core::id::IdAllocator;
use electrumrpc_core::policy::RetryPolicy;
use electrumrpc_core::progress::{HistoryStatus, NoopProgress, ProgressSink};
use electrumrpc_core::request::{JsonRpcRequest, RpcParam};
use electrumrpc_core::transport::{self, RpcTransport};

use crate::config::ElectrumRpcConfig;
use crate::error::ServerRpcError;
use crate::policy::{
    best_effort_unsubscribe, fill_fee_targets, is_total_transport_failure, PartialFailurePolicy,
};
use crate::summary::{list, path_ranges, short_txids};
use crate::types::{
    BlockHeaderTip, BlockStats, FeeEstimateTable, FeeHistogram, ScriptHashTx, VerboseTransaction,
    ERROR_TX, ZERO_HASH,
};

/// Electrum operations over one server connection.
///
/// Cheap to share behind an `Arc`: concurrent callers draw request ids from
/// the same allocator, and the transport serializes their exchanges.
pub struct ElectrumRpc {
    transport: Arc<dyn RpcTransport>,
    ids: IdAllocator,
    retry: RetryPolicy,
    config: ElectrumRpcConfig,
    progress: Arc<dyn ProgressSink>,
}

impl ElectrumRpc {
    /// Create a service over `transport`. The first request id issued is
    /// `id_seed + 1`; pass the value saved from [`id_counter_value`] to
    /// resume numbering across reconnects.
    ///
    /// [`id_counter_value`]: Self::id_counter_value
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        id_seed: u64,
        config: ElectrumRpcConfig,
    ) -> Self {
        Self {
            transport,
            ids: IdAllocator::new(id_seed),
            retry: RetryPolicy::new(config.retry),
            config,
            progress: Arc::new(NoopProgress),
        }
    }

    /// Post status updates for long fetches to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Last request id issued.
    pub fn id_counter_value(&self) -> u64 {
        self.ids.current_value()
    }

    pub fn config(&self) -> &ElectrumRpcConfig {
        &self.config
    }

    // ── single calls ────────────────────────────────────────────────────────

    pub async fn ping(&self) -> Result<(), ServerRpcError> {
        self.call::<Option<Value>>("server.ping", vec![])
            .await
            .map(drop)
            .map_err(|e| ServerRpcError::call("Error pinging server", e))
    }

    /// Negotiate the protocol version. Returns `[server_software, protocol_version]`.
    pub async fn server_version(&self) -> Result<Vec<String>, ServerRpcError> {
        let versions = match self.config.protocol_versions.as_slice() {
            [single] => Value::from(single.as_str()),
            range => Value::from(range.to_vec()),
        };
        let params = vec![Value::from(self.config.client_name.as_str()), versions];
        self.call("server.version", params)
            .await
            .map_err(|e| ServerRpcError::call("Error getting server version", e))
    }

    pub async fn server_banner(&self) -> Result<String, ServerRpcError> {
        self.call("server.banner", vec![])
            .await
            .map_err(|e| ServerRpcError::call("Error getting server banner", e))
    }

    pub async fn subscribe_block_headers(&self) -> Result<BlockHeaderTip, ServerRpcError> {
        self.call("blockchain.headers.subscribe", vec![])
            .await
            .map_err(|e| ServerRpcError::call("Error subscribing to block headers", e))
    }

    pub async fn fee_rate_histogram(&self) -> Result<FeeHistogram, ServerRpcError> {
        let pairs: Vec<(f64, f64)> = self
            .call("mempool.get_fee_histogram", vec![])
            .await
            .map_err(|e| ServerRpcError::call("Error getting fee rate histogram", e))?;
        Ok(FeeHistogram::from_pairs(&pairs))
    }

    pub async fn minimum_relay_fee(&self) -> Result<f64, ServerRpcError> {
        self.call("blockchain.relayfee", vec![])
            .await
            .map_err(|e| ServerRpcError::call("Error getting minimum relay fee", e))
    }

    /// Broadcast a raw transaction and return its txid.
    ///
    /// A rejection comes back as [`ServerRpcError::Rejected`] carrying the
    /// server's own message, which is meant to be shown to the user.
    pub async fn broadcast_transaction(&self, tx_hex: &str) -> Result<String, ServerRpcError> {
        self.call("blockchain.transaction.broadcast", vec![Value::from(tx_hex)])
            .await
            .map_err(|e| match e {
                TransportError::Rpc(rejection) => ServerRpcError::Rejected {
                    message: rejection.message,
                    code: rejection.code,
                },
                other => ServerRpcError::call("Error broadcasting transaction", other),
            })
    }

    // ── batched calls ───────────────────────────────────────────────────────

    /// Confirmed and mempool history for each derivation path's script hash.
    ///
    /// With `fail_on_error` any failed path fails the call. Otherwise failed
    /// paths map to a single [`ERROR_TX`] entry.
    pub async fn script_hash_history(
        &self,
        wallet: &str,
        path_script_hashes: &BTreeMap<String, String>,
        fail_on_error: bool,
    ) -> Result<BTreeMap<String, Vec<ScriptHashTx>>, ServerRpcError> {
        let paths = path_ranges(path_script_hashes.keys().map(String::as_str));
        self.post_status(wallet, format!("Loading transactions for {paths}"));
        self.script_hash_txs(
            "blockchain.scripthash.get_history",
            "transaction history",
            path_script_hashes,
            fail_on_error,
        )
        .await
    }

    /// Mempool transactions for each path's script hash. Failure handling
    /// matches [`script_hash_history`](Self::script_hash_history).
    pub async fn script_hash_mempool(
        &self,
        path_script_hashes: &BTreeMap<String, String>,
        fail_on_error: bool,
    ) -> Result<BTreeMap<String, Vec<ScriptHashTx>>, ServerRpcError> {
        self.script_hash_txs(
            "blockchain.scripthash.get_mempool",
            "mempool transactions",
            path_script_hashes,
            fail_on_error,
        )
        .await
    }

    /// Subscribe to every path's script hash, returning each current status
    /// (`None` for a script hash with no history).
    ///
    /// All or nothing: a partial subscription set would leave the wallet
    /// blind to some addresses.
    pub async fn subscribe_script_hashes(
        &self,
        wallet: &str,
        path_script_hashes: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, Option<String>>, ServerRpcError> {
        let paths = path_ranges(path_script_hashes.keys().map(String::as_str));
        self.post_status(wallet, format!("Finding transactions for {paths}"));

        let mut batch = self.pager();
        for (path, script_hash) in path_script_hashes {
            batch.add(
                path.clone(),
                "blockchain.scripthash.subscribe",
                vec![Value::from(script_hash.as_str())],
            );
        }

        PartialFailurePolicy::Strict
            .resolve(batch.execute().await)
            .map_err(|failure| {
                let failed = path_ranges(failure.failed_keys().map(String::as_str));
                batch_error(format!("Failed to subscribe to paths: {failed}"), &failure)
            })
    }

    /// Unsubscribe from script hashes. Never fails; see
    /// [`best_effort_unsubscribe`] for what the returned map contains.
    pub async fn unsubscribe_script_hashes(
        &self,
        script_hashes: &BTreeSet<String>,
    ) -> BTreeMap<String, bool> {
        let mut batch = self.pager();
        for script_hash in script_hashes {
            batch.add(
                script_hash.clone(),
                "blockchain.scripthash.unsubscribe",
                vec![Value::from(script_hash.as_str())],
            );
        }

        let outcome = batch.execute().await;
        if let Err(failure) = &outcome {
            tracing::info!(
                failed = %list(failure.failed_keys()),
                error = %failure,
                "failed to unsubscribe from script hashes"
            );
        }
        best_effort_unsubscribe(outcome)
    }

    /// Raw block headers by height. Heights that fail are left out.
    pub async fn block_headers(
        &self,
        wallet: &str,
        heights: &BTreeSet<u32>,
    ) -> Result<BTreeMap<u32, String>, ServerRpcError> {
        self.post_status(wallet, format!("Retrieving {} block headers", heights.len()));

        let mut batch = self.pager();
        for &height in heights {
            batch.add(height, "blockchain.block.header", vec![Value::from(height)]);
        }

        PartialFailurePolicy::KeepSuccesses
            .resolve(batch.execute().await)
            .map_err(|failure| {
                let context = format!(
                    "Failed to retrieve block headers for block heights: {}",
                    list(heights)
                );
                batch_error(context, &failure)
            })
    }

    /// Block statistics by height. Heights that fail are left out.
    pub async fn block_stats(
        &self,
        heights: &BTreeSet<u32>,
    ) -> Result<BTreeMap<u32, BlockStats>, ServerRpcError> {
        let mut batch = self.pager();
        for &height in heights {
            batch.add(height, "blockchain.block.stats", vec![Value::from(height)]);
        }

        PartialFailurePolicy::KeepSuccesses
            .resolve(batch.execute().await)
            .map_err(|failure| {
                let context = format!(
                    "Failed to retrieve block stats for block heights: {}",
                    list(heights)
                );
                batch_error(context, &failure)
            })
    }

    /// Raw transactions by txid. Failed txids map to [`ZERO_HASH`].
    pub async fn transactions(
        &self,
        wallet: &str,
        txids: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, String>, ServerRpcError> {
        self.post_status(wallet, format!("Retrieving {} transactions", txids.len()));

        let mut batch = self.pager();
        for txid in txids {
            batch.add(
                txid.clone(),
                "blockchain.transaction.get",
                vec![Value::from(txid.as_str())],
            );
        }

        PartialFailurePolicy::Substitute(ZERO_HASH.to_string())
            .resolve(batch.execute().await)
            .map_err(|failure| {
                batch_error(
                    format!(
                        "Failed to retrieve transactions for txids: {}",
                        short_txids(txids.iter().map(String::as_str))
                    ),
                    &failure,
                )
            })
    }

    /// Verbose transactions by txid, tried once each.
    ///
    /// A server error is the normal answer for a transaction that has not
    /// been broadcast yet, so failed txids are logged and left out and the
    /// call never fails.
    pub async fn verbose_transactions(
        &self,
        txids: &BTreeSet<String>,
    ) -> BTreeMap<String, VerboseTransaction> {
        let mut batch = self.pager();
        for txid in txids {
            batch.add(
                txid.clone(),
                "blockchain.transaction.get",
                vec![Value::from(txid.as_str()), Value::Bool(true)],
            );
        }

        match batch.execute_with(1).await {
            Ok(transactions) => transactions,
            Err(failure) => {
                tracing::debug!(error = %failure, "some verbose transactions were not retrieved");
                failure.successes
            }
        }
    }

    /// Fee rates for each confirmation target.
    ///
    /// Targets above the configured maximum are not asked for; they get the
    /// lowest rate fetched. Any failed target fails the call.
    pub async fn fee_estimates(&self, targets: &[u32]) -> Result<FeeEstimateTable, ServerRpcError> {
        let max_target = self.config.max_target_blocks;
        let fetchable: BTreeSet<u32> = targets
            .iter()
            .copied()
            .filter(|&t| t <= max_target)
            .collect();

        let mut batch = self.pager();
        for &target in &fetchable {
            batch.add(target, "blockchain.estimatefee", vec![Value::from(target)]);
        }

        let fetched = PartialFailurePolicy::Strict
            .resolve(batch.execute().await)
            .map_err(|failure| {
                let context = if is_total_transport_failure(&failure) {
                    format!("Error getting fee estimates for target blocks: {}", list(targets))
                } else {
                    format!("Error getting fee estimates from connected server: {failure}")
                };
                batch_error(context, &failure)
            })?;

        Ok(fill_fee_targets(targets, max_target, fetched, self.config.fee_fallback))
    }

    // ── helpers ─────────────────────────────────────────────────────────────

    /// One request with a fresh id per attempt.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<RpcParam>,
    ) -> Result<T, TransportError> {
        let conn = self.transport.as_ref();
        tracing::debug!(method, server = conn.url(), "rpc call");
        self.retry
            .execute(|| {
                let req = JsonRpcRequest::new(self.ids.next(), method, params.clone());
                transport::call::<T>(conn, req)
            })
            .await
    }

    fn pager<K, V>(&self) -> BatchPager<'_, K, V>
    where
        K: Ord + Clone + fmt::Debug,
        V: DeserializeOwned,
    {
        BatchPager::new(self.transport.as_ref(), &self.ids)
            .retry(self.retry)
            .page_size(self.config.page_size)
    }

    async fn script_hash_txs(
        &self,
        method: &str,
        what: &str,
        path_script_hashes: &BTreeMap<String, String>,
        fail_on_error: bool,
    ) -> Result<BTreeMap<String, Vec<ScriptHashTx>>, ServerRpcError> {
        let mut batch = self.pager();
        for (path, script_hash) in path_script_hashes {
            batch.add(path.clone(), method, vec![Value::from(script_hash.as_str())]);
        }

        let policy = if fail_on_error {
            PartialFailurePolicy::Strict
        } else {
            PartialFailurePolicy::Substitute(vec![ERROR_TX])
        };
        policy
            .resolve(batch.execute().await)
            .map_err(|failure| {
                batch_error(
                    format!(
                        "Failed to retrieve {what} for paths: {}",
                        path_ranges(failure.failed_keys().map(String::as_str))
                    ),
                    &failure,
                )
            })
    }

    fn post_status(&self, wallet: &str, message: String) {
        self.progress.history_status(HistoryStatus {
            wallet: wallet.to_string(),
            loading: true,
            message,
        });
    }
}

fn batch_error<K, V>(context: String, failure: &BatchFailure<K, V>) -> ServerRpcError
where
    K: Ord + fmt::Debug + fmt::Display,
{
    tracing::warn!(
        succeeded = failure.successes.len(),
        failed = failure.errors.len(),
        error = %failure,
        "{context}"
    );
    ServerRpcError::Batch {
        context,
        failures: failure
            .errors
            .iter()
            .map(|(key, error)| (key.to_string(), error.clone()))
            .collect(),
    }
}
