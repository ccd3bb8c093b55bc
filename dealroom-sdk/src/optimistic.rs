//! Optimistic mutation with rollback.
//!
//! One call moves through `Idle -> Optimistic -> Reconciled | RolledBack`:
//! the merged value is written locally before the network call, then either
//! replaced by the server's answer or restored to the pre-call snapshot.

use std::fmt::Display;
use std::future::Future;

/// Where an optimistically updated value lives.
pub trait OptimisticSlot<T>: Send + Sync {
    /// Current value, or `None` while nothing is loaded.
    fn snapshot(&self) -> Option<T>;

    fn replace(&self, value: T);

    /// Mark a mutation in flight and clear any previous error.
    fn begin(&self);

    /// Mark the mutation settled, recording the failure message if any.
    fn finish(&self, error: Option<String>);
}

/// Apply `merge(&current, &patch)` locally, run `call(patch, optimistic)`,
/// then keep the server's value or roll back.
///
/// Without a base value this is a no-op: `call` is never invoked and the
/// result is `Ok(None)`. On failure the snapshot is restored verbatim and the
/// original error is returned.
pub async fn optimistic_update<T, P, E, M, C, Fut>(
    slot: &dyn OptimisticSlot<T>,
    patch: P,
    merge: M,
    call: C,
) -> Result<Option<T>, E>
where
    T: Clone,
    E: Display,
    M: FnOnce(&T, &P) -> T,
    C: FnOnce(P, T) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let Some(snapshot) = slot.snapshot() else {
        tracing::debug!("Optimistic update skipped: nothing loaded");
        return Ok(None);
    };

    let optimistic = merge(&snapshot, &patch);
    slot.replace(optimistic.clone());
    slot.begin();

    match call(patch, optimistic).await {
        Ok(server) => {
            slot.replace(server.clone());
            slot.finish(None);
            Ok(Some(server))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Optimistic update failed, rolling back");
            slot.replace(snapshot);
            slot.finish(Some(e.to_string()));
            Err(e)
        }
    }
}
