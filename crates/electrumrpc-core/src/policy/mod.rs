//! Reliability policies applied around transport calls.
//!
//! ```text
//! Request → [RetryPolicy] → [Transport]
//! ```

pub mod retry;

pub use retry::{RetryConfig, RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
