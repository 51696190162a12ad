//! electrumrpc-client — Electrum server operations over a batching transport.
//!
//! # Features
//! - Every wallet-facing Electrum call, single or batched
//! - Batched calls paged and matched by id through `electrumrpc-core`
//! - Per-operation handling of partially failed batches
//! - Optional progress sink for long fetches

pub mod client;
pub mod config;
pub mod error;
pub mod policy;
pub mod summary;
pub mod types;

pub use client::ElectrumRpc;
pub use config::{ElectrumRpcConfig, DEFAULT_MAX_TARGET_BLOCKS, FALLBACK_FEE_RATE};
pub use error::ServerRpcError;
pub use policy::{BatchOutcome, PartialFailurePolicy};
pub use types::{
    BlockHeaderTip, BlockStats, FeeEstimateTable, FeeHistogram, FeeRate, ScriptHashTx,
    VerboseTransaction, ERROR_TX, ZERO_HASH,
};
