//! Partial-failure policies for batched operations.
//!
//! Each batched operation decides what a batch with failed keys means for
//! its caller. The decisions are pure functions over the batch outcome so
//! they can be exercised without a server.

use std::collections::BTreeMap;

use electrumrpc_core::batch::{BatchFailure, EntryError};

/// Outcome of a paged batch: every key answered, or a failure carrying the
/// partial results.
pub type BatchOutcome<K, V> = Result<BTreeMap<K, V>, BatchFailure<K, V>>;

/// What to do with keys that failed inside an otherwise answered batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialFailurePolicy<V> {
    /// Any failed key fails the whole operation.
    Strict,
    /// Failed keys are filled with a copy of the given value.
    Substitute(V),
    /// Failed keys are left out.
    KeepSuccesses,
}

impl<V: Clone> PartialFailurePolicy<V> {
    /// Shape `outcome` according to the policy.
    ///
    /// Whatever the policy, a batch in which nothing at all got through the
    /// transport is handed back as a failure: there is nothing to salvage.
    pub fn resolve<K>(self, outcome: BatchOutcome<K, V>) -> BatchOutcome<K, V>
    where
        K: Ord + Clone,
    {
        let failure = match outcome {
            Ok(values) => return Ok(values),
            Err(failure) => failure,
        };
        if is_total_transport_failure(&failure) {
            return Err(failure);
        }

        match self {
            Self::Strict => Err(failure),
            Self::Substitute(sentinel) => {
                let mut values = failure.successes;
                for key in failure.errors.keys() {
                    values.insert(key.clone(), sentinel.clone());
                }
                Ok(values)
            }
            Self::KeepSuccesses => Ok(failure.successes),
        }
    }
}

/// `true` when no key succeeded and every key was lost to the transport.
pub fn is_total_transport_failure<K: Ord, V>(failure: &BatchFailure<K, V>) -> bool {
    failure.successes.is_empty()
        && !failure.errors.is_empty()
        && failure
            .errors
            .values()
            .all(|e| matches!(e, EntryError::Transport(_)))
}

/// Best-effort unsubscribe: every script hash the server answered counts as
/// unsubscribed.
///
/// A server rejection (typically "not subscribed") is treated exactly like a
/// successful answer, so repeating an unsubscribe yields the same result.
/// Only keys the server never answered are left out; a total transport
/// failure therefore yields an empty map.
pub fn best_effort_unsubscribe<K>(outcome: BatchOutcome<K, bool>) -> BTreeMap<K, bool>
where
    K: Ord,
{
    match outcome {
        Ok(answered) => answered.into_keys().map(|k| (k, true)).collect(),
        Err(failure) => failure
            .successes
            .into_keys()
            .map(|k| (k, true))
            .chain(
                failure
                    .errors
                    .into_iter()
                    .filter(|(_, e)| e.is_rejection())
                    .map(|(k, _)| (k, true)),
            )
            .collect(),
    }
}

/// Complete a fee table for `targets`.
///
/// Targets up to `max_target` take their fetched rate. Targets above it take
/// the lowest fetched rate, or `fallback` if nothing was fetched.
pub fn fill_fee_targets(
    targets: &[u32],
    max_target: u32,
    mut fetched: BTreeMap<u32, f64>,
    fallback: f64,
) -> BTreeMap<u32, f64> {
    let floor = fetched
        .values()
        .copied()
        .min_by(f64::total_cmp)
        .unwrap_or(fallback);
    for &target in targets {
        if target > max_target {
            fetched.insert(target, floor);
        }
    }
    fetched
}
