//! End-to-end behavior of `ElectrumRpc` against a scripted server.

mod support;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use electrumrpc_client::{ElectrumRpc, ServerRpcError, ERROR_TX, ZERO_HASH};
use electrumrpc_core::batch::EntryError;
use electrumrpc_core::error::TransportError;
use electrumrpc_core::request::{JsonRpcError, JsonRpcRequest};
use serde_json::{json, Value};
use support::{fast_config, param0, rejection, service, MockServer, RecordingProgress};

fn paths(n: u32) -> BTreeMap<String, String> {
    (0..n).map(|i| (format!("m/0/{i}"), format!("sh{i}"))).collect()
}

fn history_for(req: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
    match param0(req) {
        "sh1" => Err(rejection("history too large")),
        sh => Ok(json!([{ "height": 800000, "tx_hash": format!("tx-{sh}") }])),
    }
}

// ─── Single calls ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn ping_retries_until_ready() {
    let server = MockServer::failing(
        vec![
            TransportError::NotReady("handshake".into()),
            TransportError::NotReady("handshake".into()),
        ],
        |_| Ok(Value::Null),
    );
    let rpc = service(&server);

    rpc.ping().await.unwrap();
    assert_eq!(server.round_trips(), 3);
    // Only the last attempt reached the server; each attempt drew a new id.
    assert_eq!(server.requests()[0].id_number(), Some(3));
    assert_eq!(rpc.id_counter_value(), 3);
}

#[tokio::test]
async fn single_call_failure_names_operation() {
    let server = MockServer::failing(vec![TransportError::Closed], |_| Ok(Value::Null));
    let rpc = service(&server);

    let err = rpc.server_banner().await.unwrap_err();
    assert_eq!(err.to_string(), "Error getting server banner");
    assert!(matches!(err, ServerRpcError::Call { source: TransportError::Closed, .. }));
    assert_eq!(server.round_trips(), 1);
}

#[tokio::test]
async fn server_version_offers_client_and_protocol() {
    let server = MockServer::new(|req| {
        assert_eq!(req.params[1], "1.4");
        Ok(json!(["ElectrumX 1.16.0", "1.4"]))
    });
    let rpc = service(&server);

    let version = rpc.server_version().await.unwrap();
    assert_eq!(version, ["ElectrumX 1.16.0", "1.4"]);

    let mut config = fast_config();
    config.protocol_versions = vec!["1.4".into(), "1.4.2".into()];
    let server = MockServer::new(|req| Ok(req.params[1].clone()));
    let rpc = ElectrumRpc::new(server.clone(), 0, config);
    assert_eq!(rpc.server_version().await.unwrap(), ["1.4", "1.4.2"]);
}

#[tokio::test]
async fn broadcast_rejection_is_verbatim() {
    let server = MockServer::new(|_| Err(rejection("min relay fee not met, 110 < 141")));
    let rpc = service(&server);

    let err = rpc.broadcast_transaction("0200aa").await.unwrap_err();
    assert_eq!(err.to_string(), "min relay fee not met, 110 < 141");
    // A rejection is an answer, not a transient failure.
    assert_eq!(server.round_trips(), 1);
}

#[tokio::test]
async fn broadcast_returns_txid() {
    let server = MockServer::new(|req| Ok(json!(format!("txid-of-{}", param0(req)))));
    let rpc = service(&server);
    assert_eq!(rpc.broadcast_transaction("0200aa").await.unwrap(), "txid-of-0200aa");
}

#[tokio::test]
async fn histogram_drops_zero_rate() {
    let server = MockServer::new(|_| Ok(json!([[5, 100], [0, 50], [10, 20]])));
    let rpc = service(&server);

    let histogram = rpc.fee_rate_histogram().await.unwrap();
    assert_eq!(histogram.iter().collect::<Vec<_>>(), [(5.0, 100), (10.0, 20)]);
}

#[tokio::test]
async fn header_tip_and_relay_fee() {
    let server = MockServer::new(|req| match req.method.as_str() {
        "blockchain.headers.subscribe" => Ok(json!({ "height": 850000, "hex": "00e0ff3f" })),
        "blockchain.relayfee" => Ok(json!(0.00001)),
        other => panic!("unexpected {other}"),
    });
    let rpc = service(&server);

    let tip = rpc.subscribe_block_headers().await.unwrap();
    assert_eq!(tip.height, 850000);
    assert_eq!(rpc.minimum_relay_fee().await.unwrap(), 0.00001);
}

// ─── Batched calls ────────────────────────────────────────────────────────────

#[tokio::test]
async fn history_substitutes_error_tx() {
    let server = MockServer::new(history_for);
    let rpc = service(&server);

    let history = rpc.script_hash_history("w", &paths(3), false).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history["m/0/1"], vec![ERROR_TX]);
    assert_eq!(history["m/0/0"][0].tx_hash, "tx-sh0");
    assert_eq!(history["m/0/2"][0].height, 800000);
}

#[tokio::test]
async fn history_fail_on_error_lists_paths() {
    let server = MockServer::new(history_for);
    let rpc = service(&server);

    let err = rpc.script_hash_history("w", &paths(3), true).await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to retrieve transaction history for paths: m/0/1");
    assert_eq!(err.failed_keys(), ["m/0/1"]);
    assert!(matches!(err.failures()[0].1, EntryError::Rejected(_)));
}

#[tokio::test]
async fn mempool_follows_history_policy() {
    let server = MockServer::new(history_for);
    let rpc = service(&server);

    let mempool = rpc.script_hash_mempool(&paths(2), false).await.unwrap();
    assert!(mempool["m/0/1"][0].is_error());
    assert_eq!(server.methods(), ["blockchain.scripthash.get_mempool"; 2]);

    let err = rpc.script_hash_mempool(&paths(2), true).await.unwrap_err();
    assert!(err.to_string().starts_with("Failed to retrieve mempool transactions"));
}

#[tokio::test]
async fn history_total_transport_failure_is_an_error() {
    let server = MockServer::failing(vec![TransportError::Closed], history_for);
    let rpc = service(&server);

    let err = rpc.script_hash_history("w", &paths(3), false).await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to retrieve transaction history for paths: m/0/0-2");
    assert_eq!(err.failed_keys(), ["m/0/0", "m/0/1", "m/0/2"]);
    assert!(err
        .failures()
        .iter()
        .all(|(_, e)| matches!(e, EntryError::Transport(_))));
}

#[tokio::test]
async fn subscribe_fails_if_one_in_a_hundred_fails() {
    let server = MockServer::new(|req| match param0(req) {
        "sh42" => Err(rejection("unknown")),
        _ => Ok(Value::Null),
    });
    let rpc = service(&server);

    let err = rpc.subscribe_script_hashes("w", &paths(100)).await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to subscribe to paths: m/0/42");
    assert_eq!(err.failed_keys(), ["m/0/42"]);
}

#[tokio::test]
async fn subscribe_returns_statuses() {
    let server = MockServer::new(|req| match param0(req) {
        "sh0" => Ok(Value::Null),
        sh => Ok(json!(format!("status-{sh}"))),
    });
    let rpc = service(&server);

    let statuses = rpc.subscribe_script_hashes("w", &paths(2)).await.unwrap();
    assert_eq!(statuses["m/0/0"], None);
    assert_eq!(statuses["m/0/1"].as_deref(), Some("status-sh1"));
}

#[tokio::test]
async fn unsubscribe_twice_is_idempotent() {
    let subscribed: Arc<Mutex<HashSet<String>>> =
        Arc::new(Mutex::new(["a", "b"].iter().map(|s| s.to_string()).collect()));
    let state = subscribed.clone();
    let server = MockServer::new(move |req| {
        if state.lock().unwrap().remove(param0(req)) {
            Ok(Value::Bool(true))
        } else {
            Err(rejection("not subscribed"))
        }
    });
    let rpc = service(&server);
    let keys: BTreeSet<String> = ["a".to_string(), "b".to_string()].into();

    let first = rpc.unsubscribe_script_hashes(&keys).await;
    let second = rpc.unsubscribe_script_hashes(&keys).await;
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert!(first.values().all(|v| *v));
    assert!(subscribed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unsubscribe_never_raises() {
    let server = MockServer::failing(vec![TransportError::Closed], |_| Ok(Value::Bool(true)));
    let rpc = service(&server);
    let keys: BTreeSet<String> = ["a".to_string()].into();

    assert!(rpc.unsubscribe_script_hashes(&keys).await.is_empty());
}

#[tokio::test]
async fn block_headers_drop_failed_heights() {
    let server = MockServer::new(|req| match req.params[0].as_u64() {
        Some(101) => Err(rejection("height out of range")),
        Some(h) => Ok(json!(format!("header-{h}"))),
        None => panic!("height must be a number"),
    });
    let rpc = service(&server);

    let heights: BTreeSet<u32> = [100, 101, 102].into();
    let headers = rpc.block_headers("w", &heights).await.unwrap();
    assert_eq!(headers.keys().copied().collect::<Vec<_>>(), [100, 102]);
    assert_eq!(headers[&102], "header-102");
}

#[tokio::test]
async fn block_stats_keep_successes_but_not_a_dead_connection() {
    let server = MockServer::new(|req| match req.params[0].as_u64() {
        Some(7) => Err(rejection("no stats")),
        Some(h) => Ok(json!({ "height": h, "feerate_percentiles": [1, 2, 3, 4, 5] })),
        None => panic!("height must be a number"),
    });
    let rpc = service(&server);
    let stats = rpc.block_stats(&[6, 7].into()).await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[&6].feerate_percentiles.len(), 5);

    let dead = MockServer::failing(vec![TransportError::Closed], |_| Ok(json!({})));
    let err = service(&dead).block_stats(&[6, 7].into()).await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to retrieve block stats for block heights: 6, 7");
    assert_eq!(err.failed_keys(), ["6", "7"]);
}

#[tokio::test]
async fn transactions_substitute_zero_hash() {
    let server = MockServer::new(|req| match param0(req) {
        "bad" => Err(rejection("missing")),
        txid => Ok(json!(format!("raw-{txid}"))),
    });
    let rpc = service(&server);

    let txids: BTreeSet<String> = ["good".to_string(), "bad".to_string()].into();
    let txs = rpc.transactions("w", &txids).await.unwrap();
    assert_eq!(txs["good"], "raw-good");
    assert_eq!(txs["bad"], ZERO_HASH);
}

#[tokio::test]
async fn verbose_transactions_try_once_and_never_raise() {
    let server = MockServer::new(|req| {
        assert_eq!(req.params[1], Value::Bool(true));
        match param0(req) {
            "unbroadcast" => Err(rejection("No such mempool or blockchain transaction")),
            txid => Ok(json!({ "txid": txid, "confirmations": 2 })),
        }
    });
    let rpc = service(&server);
    let txids: BTreeSet<String> = ["seen".to_string(), "unbroadcast".to_string()].into();

    let txs = rpc.verbose_transactions(&txids).await;
    assert_eq!(txs.len(), 1);
    assert_eq!(txs["seen"].confirmations, Some(2));
    assert_eq!(server.round_trips(), 1);

    let busy = MockServer::failing(vec![TransportError::NotReady("busy".into())], |_| {
        Ok(json!({}))
    });
    assert!(service(&busy).verbose_transactions(&txids).await.is_empty());
    assert_eq!(busy.round_trips(), 1);
}

#[tokio::test]
async fn fee_estimates_back_fill_far_targets() {
    let server = MockServer::new(|req| match req.params[0].as_u64() {
        Some(1) => Ok(json!(0.5)),
        Some(2) => Ok(json!(0.3)),
        Some(3) => Ok(json!(0.2)),
        other => panic!("unexpected target {other:?}"),
    });
    let rpc = service(&server);

    let table = rpc.fee_estimates(&[1, 2, 3, 200]).await.unwrap();
    assert_eq!(table[&1], 0.5);
    assert_eq!(table[&3], 0.2);
    assert_eq!(table[&200], 0.2);
    assert_eq!(server.requests().len(), 3);
}

#[tokio::test]
async fn fee_estimates_fallback_without_fetching() {
    let server = MockServer::new(|_| panic!("nothing should be fetched"));
    let rpc = service(&server);

    let table = rpc.fee_estimates(&[100, 500]).await.unwrap();
    assert_eq!(table[&100], 0.0001);
    assert_eq!(table[&500], 0.0001);
    assert_eq!(server.round_trips(), 0);
}

#[tokio::test]
async fn fee_estimates_reject_incomplete_tables() {
    let server = MockServer::new(|req| match req.params[0].as_u64() {
        Some(2) => Err(rejection("daemon error")),
        _ => Ok(json!(0.4)),
    });
    let rpc = service(&server);

    let err = rpc.fee_estimates(&[1, 2, 200]).await.unwrap_err();
    assert!(err
        .to_string()
        .starts_with("Error getting fee estimates from connected server"));
}

// ─── Shared state ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_callers_get_unique_ids() {
    let server = MockServer::new(|_| Ok(Value::Null));
    let rpc = Arc::new(ElectrumRpc::new(server.clone(), 1_000, fast_config()));

    let calls = (0..50).map(|_| {
        let rpc = rpc.clone();
        async move { rpc.ping().await }
    });
    for result in futures::future::join_all(calls).await {
        result.unwrap();
    }

    let ids: HashSet<u64> = server.requests().iter().filter_map(|r| r.id_number()).collect();
    assert_eq!(ids.len(), 50);
    assert!(ids.iter().all(|&id| id > 1_000));
    assert_eq!(rpc.id_counter_value(), 1_050);
    assert_eq!(ids.iter().max().copied(), Some(rpc.id_counter_value()));
}

#[tokio::test]
async fn progress_is_posted_before_long_fetches() {
    let server = MockServer::new(history_for);
    let progress = Arc::new(RecordingProgress::default());
    let rpc = service(&server).with_progress(progress.clone());

    rpc.script_hash_history("hot", &paths(3), false).await.unwrap();
    rpc.transactions("hot", &["aa".to_string()].into()).await.unwrap();

    let updates = progress.updates.lock().unwrap();
    let messages: Vec<&str> = updates.iter().map(|u| u.message.as_str()).collect();
    assert_eq!(messages, ["Loading transactions for m/0/0-2", "Retrieving 1 transactions"]);
    assert!(updates.iter().all(|u| u.wallet == "hot" && u.loading));
}

#[tokio::test]
async fn large_batches_are_paged() {
    let server = MockServer::new(|_| Ok(Value::Null));
    let mut config = fast_config();
    config.page_size = 10;
    let rpc = ElectrumRpc::new(server.clone(), 0, config);

    let statuses = rpc.subscribe_script_hashes("w", &paths(25)).await.unwrap();
    assert_eq!(statuses.len(), 25);
    assert_eq!(server.round_trips(), 3);
}
