//! Paged JSON-RPC batching keyed by caller-defined identities.
//!
//! A [`BatchPager`] collects `(key, method, params)` entries and sends them as
//! one or more JSON-RPC batch calls of at most `page_size` requests. Every
//! response is matched back to its key through the request id it was sent
//! with, so servers are free to answer in any order.
//!
//! Failures are tracked per key. A page whose transport call fails (after
//! retries) marks all of its keys failed without touching other pages. When
//! anything failed, the caller receives a [`BatchFailure`] that still carries
//! every result that did decode.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::error::TransportError;
use crate::id::IdAllocator;
use crate::policy::RetryPolicy;
use crate::request::{JsonRpcError, JsonRpcRequest, RpcParam};
use crate::transport::RpcTransport;

/// Largest number of requests sent in a single batch call.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Why a single batch entry produced no value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EntryError {
    /// The server answered this request with an error object.
    #[error("server rejected request: {0}")]
    Rejected(JsonRpcError),

    /// The page carrying this request could not be exchanged at all.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server answered the page but not this request.
    #[error("no response received")]
    Missing,

    /// The result did not have the expected shape.
    #[error("could not decode result: {0}")]
    Decode(String),
}

impl EntryError {
    /// `true` if the server itself answered with an error for this key.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// One queued request and the key it answers for.
#[derive(Debug, Clone)]
pub struct BatchEntry<K> {
    pub key: K,
    pub method: String,
    pub params: Vec<RpcParam>,
}

/// Per-key outcome of a batch: successes and errors never share a key.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult<K: Ord, V> {
    pub successes: BTreeMap<K, V>,
    pub errors: BTreeMap<K, EntryError>,
}

impl<K: Ord, V> Default for BatchResult<K, V> {
    fn default() -> Self {
        Self {
            successes: BTreeMap::new(),
            errors: BTreeMap::new(),
        }
    }
}

impl<K: Ord, V> BatchResult<K, V> {
    pub fn succeed(&mut self, key: K, value: V) {
        self.errors.remove(&key);
        self.successes.insert(key, value);
    }

    pub fn fail(&mut self, key: K, error: EntryError) {
        self.successes.remove(&key);
        self.errors.insert(key, error);
    }

    /// Fold another (disjoint) result into this one.
    pub fn merge(&mut self, other: BatchResult<K, V>) {
        for (key, value) in other.successes {
            self.succeed(key, value);
        }
        for (key, error) in other.errors {
            self.fail(key, error);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// The success map if nothing failed, otherwise a [`BatchFailure`].
    pub fn into_result(self) -> Result<BTreeMap<K, V>, BatchFailure<K, V>> {
        if self.errors.is_empty() {
            Ok(self.successes)
        } else {
            Err(BatchFailure {
                successes: self.successes,
                errors: self.errors,
            })
        }
    }
}

/// A batch in which at least one key failed.
///
/// Carries everything that did succeed so the caller can decide what to keep.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure<K: Ord, V> {
    pub successes: BTreeMap<K, V>,
    pub errors: BTreeMap<K, EntryError>,
}

impl<K: Ord, V> BatchFailure<K, V> {
    /// Keys that failed, in key order.
    pub fn failed_keys(&self) -> impl Iterator<Item = &K> {
        self.errors.keys()
    }

    /// `true` if every failed key was rejected by the server (as opposed to
    /// lost to a transport failure or a decode problem).
    pub fn all_rejections(&self) -> bool {
        self.errors.values().all(EntryError::is_rejection)
    }
}

impl<K: Ord + fmt::Debug, V> fmt::Display for BatchFailure<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.successes.len() + self.errors.len();
        write!(f, "{} of {} batch entries failed: ", self.errors.len(), total)?;
        let mut first = true;
        for (key, err) in &self.errors {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{key:?} ({err})")?;
        }
        Ok(())
    }
}

impl<K: Ord + fmt::Debug, V: fmt::Debug> std::error::Error for BatchFailure<K, V> {}

/// Accumulates keyed requests and executes them as paged batch calls.
///
/// Keys must be unique within one pager; duplicates are not detected and the
/// later result for a key overwrites the earlier one.
pub struct BatchPager<'a, K, V> {
    transport: &'a dyn RpcTransport,
    ids: &'a IdAllocator,
    retry: RetryPolicy,
    page_size: usize,
    entries: Vec<BatchEntry<K>>,
    _value: PhantomData<fn() -> V>,
}

impl<'a, K, V> BatchPager<'a, K, V>
where
    K: Ord + Clone + fmt::Debug,
    V: DeserializeOwned,
{
    pub fn new(transport: &'a dyn RpcTransport, ids: &'a IdAllocator) -> Self {
        Self {
            transport,
            ids,
            retry: RetryPolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
            entries: Vec::new(),
            _value: PhantomData,
        }
    }

    /// Retry policy applied to each page.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Maximum requests per batch call. Zero is treated as one.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Queue one request answering for `key`.
    pub fn add(&mut self, key: K, method: impl Into<String>, params: Vec<RpcParam>) -> &mut Self {
        self.entries.push(BatchEntry {
            key,
            method: method.into(),
            params,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of batch calls [`execute`](Self::execute) will make.
    pub fn page_count(&self) -> usize {
        self.entries.len().div_ceil(self.page_size)
    }

    /// Execute with the pager's retry policy.
    pub async fn execute(&self) -> Result<BTreeMap<K, V>, BatchFailure<K, V>> {
        self.execute_with(self.retry.max_attempts()).await
    }

    /// Execute allowing `max_attempts` tries per page.
    ///
    /// Pass `1` when a server error is an expected answer that retrying
    /// cannot change.
    pub async fn execute_with(
        &self,
        max_attempts: u32,
    ) -> Result<BTreeMap<K, V>, BatchFailure<K, V>> {
        let retry = self.retry.with_max_attempts(max_attempts);
        let mut result = BatchResult::default();

        for (page_no, page) in self.entries.chunks(self.page_size).enumerate() {
            let page_result = self.execute_page(page_no, page, retry).await;
            result.merge(page_result);
        }

        if !result.is_complete() {
            tracing::debug!(
                succeeded = result.successes.len(),
                failed = result.errors.len(),
                "batch completed with failures"
            );
        }
        result.into_result()
    }

    async fn execute_page(
        &self,
        page_no: usize,
        page: &[BatchEntry<K>],
        retry: RetryPolicy,
    ) -> BatchResult<K, V> {
        let mut result = BatchResult::default();

        match retry.execute(|| self.send_page(page_no, page)).await {
            Ok(answers) => {
                for (entry, answer) in page.iter().zip(answers) {
                    match answer {
                        Some(Ok(value)) => match serde_json::from_value::<V>(value) {
                            Ok(decoded) => result.succeed(entry.key.clone(), decoded),
                            Err(e) => {
                                result.fail(entry.key.clone(), EntryError::Decode(e.to_string()))
                            }
                        },
                        Some(Err(rejection)) => {
                            result.fail(entry.key.clone(), EntryError::Rejected(rejection))
                        }
                        None => result.fail(entry.key.clone(), EntryError::Missing),
                    }
                }
            }
            Err(err) => {
                tracing::warn!(
                    page = page_no,
                    entries = page.len(),
                    error = %err,
                    server = self.transport.url(),
                    "batch page failed"
                );
                let reason = err.to_string();
                for entry in page {
                    result.fail(entry.key.clone(), EntryError::Transport(reason.clone()));
                }
            }
        }

        result
    }

    /// One attempt at a page: fresh ids, one batch call, answers in entry order.
    async fn send_page(
        &self,
        page_no: usize,
        page: &[BatchEntry<K>],
    ) -> Result<Vec<Option<Result<Value, JsonRpcError>>>, TransportError> {
        let mut positions = HashMap::with_capacity(page.len());
        let requests: Vec<JsonRpcRequest> = page
            .iter()
            .enumerate()
            .map(|(pos, entry)| {
                let id = self.ids.next();
                positions.insert(id, pos);
                JsonRpcRequest::new(id, entry.method.clone(), entry.params.clone())
            })
            .collect();

        tracing::debug!(
            page = page_no,
            entries = page.len(),
            method = page.first().map(|e| e.method.as_str()).unwrap_or_default(),
            "sending batch page"
        );

        let responses = self.transport.send_batch(requests).await?;

        let mut answers: Vec<Option<Result<Value, JsonRpcError>>> = vec![None; page.len()];
        for resp in responses {
            match resp.id.as_u64().and_then(|id| positions.get(&id)) {
                Some(&pos) => answers[pos] = Some(resp.into_result()),
                None => tracing::debug!(id = %resp.id, "ignoring response with unknown id"),
            }
        }
        Ok(answers)
    }
}
