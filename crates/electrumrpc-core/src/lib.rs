//! electrumrpc-core — request plumbing shared by Electrum client operations.
//!
//! # Overview
//!
//! - [`RpcTransport`] — the async trait a live server connection implements
//! - [`JsonRpcRequest`] / [`JsonRpcResponse`] — wire types
//! - [`TransportError`] — structured error type
//! - [`IdAllocator`] — monotonic request ids shared by concurrent callers
//! - [`policy`] module — fixed-delay retry for transient failures
//! - [`batch`] module — paged batch calls keyed by caller identities
//! - [`progress`] module — optional status sink for long fetches

pub mod batch;
pub mod error;
pub mod id;
pub mod policy;
pub mod progress;
pub mod request;
pub mod transport;

pub use batch::{BatchEntry, BatchFailure, BatchPager, BatchResult, EntryError, DEFAULT_PAGE_SIZE};
pub use error::TransportError;
pub use id::IdAllocator;
pub use policy::{RetryConfig, RetryPolicy};
pub use progress::{HistoryStatus, NoopProgress, ProgressSink};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId, RpcParam};
pub use transport::RpcTransport;
