//! Request id allocation shared by every caller of one connection.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic JSON-RPC request id source.
///
/// Ids are strictly increasing and never handed out twice, even when the
/// request carrying them fails. The owner of the connection may persist
/// [`current_value`](Self::current_value) and seed a new allocator with it
/// after reconnecting.
#[derive(Debug, Default)]
pub struct IdAllocator {
    counter: AtomicU64,
}

impl IdAllocator {
    /// Create an allocator whose first id will be `seed + 1`.
    pub fn new(seed: u64) -> Self {
        Self {
            counter: AtomicU64::new(seed),
        }
    }

    /// Issue the next id.
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The most recently issued id (the seed if none was issued yet).
    pub fn current_value(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}
