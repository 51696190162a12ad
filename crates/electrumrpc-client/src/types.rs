//! Electrum result payloads.
//!
//! Only the fields the wallet core relies on are typed. Anything else a
//! server sends is preserved in `extra`.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// All-zero transaction hash, used as a stand-in for data that failed to load.
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One entry of `blockchain.scripthash.get_history` / `get_mempool`.
///
/// `height > 0` is confirmed, `0` is in the mempool, `-1` is in the mempool
/// with unconfirmed parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptHashTx {
    pub height: i64,
    pub tx_hash: Cow<'static, str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,
}

/// Placeholder history entry for a script hash whose history failed to load.
pub const ERROR_TX: ScriptHashTx = ScriptHashTx {
    height: 0,
    tx_hash: Cow::Borrowed(ZERO_HASH),
    fee: None,
};

impl ScriptHashTx {
    /// `true` for the [`ERROR_TX`] placeholder.
    pub fn is_error(&self) -> bool {
        self.tx_hash == ZERO_HASH
    }
}

/// Chain tip returned by `blockchain.headers.subscribe`, and the shape of
/// every later header notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeaderTip {
    pub height: u64,
    pub hex: String,
}

/// Result of `blockchain.block.stats`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockStats {
    #[serde(default)]
    pub height: Option<u64>,
    #[serde(default)]
    pub blockhash: Option<String>,
    #[serde(default)]
    pub feerate_percentiles: Vec<f64>,
    #[serde(default)]
    pub total_weight: Option<u64>,
    #[serde(default)]
    pub txs: Option<u64>,
    #[serde(default)]
    pub mediantime: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of `blockchain.transaction.get` with `verbose = true`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VerboseTransaction {
    #[serde(default)]
    pub txid: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub hex: Option<String>,
    #[serde(default)]
    pub blockhash: Option<String>,
    #[serde(default)]
    pub confirmations: Option<u64>,
    #[serde(default)]
    pub time: Option<u64>,
    #[serde(default)]
    pub blocktime: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Target confirmation block count → fee rate (BTC/kB, as the server reports it).
pub type FeeEstimateTable = BTreeMap<u32, f64>;

/// A fee rate usable as an ordered map key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeeRate(pub f64);

impl PartialEq for FeeRate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FeeRate {}

impl PartialOrd for FeeRate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FeeRate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Mempool fee histogram: fee rate (ascending) → virtual size at that rate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeeHistogram {
    entries: BTreeMap<FeeRate, u64>,
}

impl FeeHistogram {
    /// Build from `mempool.get_fee_histogram` pairs, dropping any pair whose
    /// rate is not positive or whose size is below one vbyte.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        let entries = pairs
            .iter()
            .filter(|(rate, size)| *rate > 0.0 && *size >= 1.0)
            .map(|&(rate, size)| (FeeRate(rate), size as u64))
            .collect();
        Self { entries }
    }

    pub fn get(&self, rate: f64) -> Option<u64> {
        self.entries.get(&FeeRate(rate)).copied()
    }

    /// Entries in ascending fee-rate order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, u64)> + '_ {
        self.entries.iter().map(|(rate, size)| (rate.0, *size))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
