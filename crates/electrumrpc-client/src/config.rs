//! Configuration for [`ElectrumRpc`](crate::ElectrumRpc).

use electrumrpc_core::batch::DEFAULT_PAGE_SIZE;
use electrumrpc_core::policy::RetryConfig;

/// Highest confirmation target fetched from the server by default.
pub const DEFAULT_MAX_TARGET_BLOCKS: u32 = 25;

/// Fee rate (BTC/kB) used when no estimate could be fetched at all.
pub const FALLBACK_FEE_RATE: f64 = 0.0001;

/// Configuration for `ElectrumRpc`.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectrumRpcConfig {
    /// Attempts and delay for single calls and for every batch page.
    pub retry: RetryConfig,
    /// Maximum requests per batch call.
    pub page_size: usize,
    /// Targets above this are not sent to the server; they get the lowest
    /// fetched rate instead.
    pub max_target_blocks: u32,
    /// Rate used for synthesized targets when nothing was fetched.
    pub fee_fallback: f64,
    /// Sent as `client_name` in `server.version`.
    pub client_name: String,
    /// Protocol versions offered in `server.version`: one exact version, or
    /// the lowest and highest acceptable.
    pub protocol_versions: Vec<String>,
}

impl Default for ElectrumRpcConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            max_target_blocks: DEFAULT_MAX_TARGET_BLOCKS,
            fee_fallback: FALLBACK_FEE_RATE,
            client_name: format!("electrumrpc {}", env!("CARGO_PKG_VERSION")),
            protocol_versions: vec!["1.4".into()],
        }
    }
}
