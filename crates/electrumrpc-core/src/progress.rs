//! Coarse progress reporting for long-running batched fetches.

/// A status update posted before a long-running fetch starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryStatus {
    /// Identifies the wallet the fetch is for.
    pub wallet: String,
    /// `true` while the fetch is in flight.
    pub loading: bool,
    /// Human-readable summary, e.g. `"Loading transactions for m/0/0-19"`.
    pub message: String,
}

/// Receiver of [`HistoryStatus`] updates.
///
/// Purely observational: nothing it does influences the request flow.
pub trait ProgressSink: Send + Sync {
    fn history_status(&self, status: HistoryStatus);
}

/// Discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn history_status(&self, _status: HistoryStatus) {}
}
