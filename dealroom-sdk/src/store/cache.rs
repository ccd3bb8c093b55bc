//! Keyed cache of server entities with request coalescing.
//!
//! Holds the canonical entries, at most one in-flight fetch per id, the
//! shared `loading`/`error` flags and an optional `current` id. While a fetch
//! for an id is in flight, every local or push-driven write to that id bumps
//! its revision; ids with nothing in flight carry no revision.
//!
//! A fetch that settles after the id's revision moved does not overwrite the
//! cache: the pushed state wins and the fetch resolves to it.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::api::ApiResult;
use crate::optimistic::OptimisticSlot;

type PendingFetch<T> = Shared<BoxFuture<'static, Option<Arc<T>>>>;

struct CacheState<T> {
    entries: HashMap<String, Arc<T>>,
    pending: HashMap<String, PendingFetch<T>>,
    revisions: HashMap<String, u64>,
    saving: HashSet<String>,
    current: Option<String>,
    error: Option<String>,
}

impl<T> Default for CacheState<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            pending: HashMap::new(),
            revisions: HashMap::new(),
            saving: HashSet::new(),
            current: None,
            error: None,
        }
    }
}

impl<T> CacheState<T> {
    fn revision(&self, id: &str) -> u64 {
        self.revisions.get(id).copied().unwrap_or(0)
    }

    /// Only an in-flight fetch can be superseded, so idle ids are not tracked.
    fn bump(&mut self, id: &str) {
        if self.pending.contains_key(id) {
            *self.revisions.entry(id.to_string()).or_insert(0) += 1;
        }
    }
}

/// Cheap to clone; clones share one cache.
pub struct ResourceCache<T> {
    kind: &'static str,
    state: Arc<Mutex<CacheState<T>>>,
}

impl<T> Clone for ResourceCache<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            state: self.state.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> ResourceCache<T> {
    /// `kind` names the resource in log lines.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.state.lock().entries.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().entries.contains_key(id)
    }

    /// Return the cached entry, join the fetch already in flight for `id`,
    /// or start one with `fetch`.
    ///
    /// The fetch runs on its own task and commits its result even if every
    /// caller stops waiting. 404 resolves to `None` without touching `error`;
    /// any other failure is logged, recorded in `error`, and also resolves to
    /// `None`. With `make_current`, a resolved entry becomes `current` and a
    /// miss clears it.
    pub async fn fetch_with<F, Fut>(&self, id: &str, make_current: bool, fetch: F) -> Option<Arc<T>>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let pending = {
            let mut state = self.state.lock();
            if let Some(hit) = state.entries.get(id).cloned() {
                if make_current {
                    state.current = Some(id.to_string());
                }
                return Some(hit);
            }
            match state.pending.get(id) {
                Some(pending) => pending.clone(),
                None => {
                    let started_at = state.revision(id);
                    state.error = None;
                    let request = fetch(id.to_string());
                    let cache = self.clone();
                    let key = id.to_string();
                    let task = tokio::spawn(async move {
                        let result = request.await;
                        cache.settle(&key, started_at, result)
                    });
                    let pending = async move { task.await.ok().flatten() }.boxed().shared();
                    state.pending.insert(id.to_string(), pending.clone());
                    pending
                }
            }
        };

        let resolved = pending.await;
        if make_current {
            let mut state = self.state.lock();
            state.current = resolved.as_ref().map(|_| id.to_string());
        }
        resolved
    }

    fn settle(&self, id: &str, started_at: u64, result: ApiResult<T>) -> Option<Arc<T>> {
        let mut state = self.state.lock();
        state.pending.remove(id);
        let superseded = state.revision(id) != started_at;
        state.revisions.remove(id);

        match result {
            Ok(value) if !superseded => {
                let value = Arc::new(value);
                state.entries.insert(id.to_string(), value.clone());
                Some(value)
            }
            Ok(_) => {
                tracing::debug!(kind = self.kind, id, "Entry changed during fetch, keeping pushed state");
                state.entries.get(id).cloned()
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(kind = self.kind, id, "Not found");
                state.entries.get(id).cloned()
            }
            Err(e) => {
                tracing::warn!(kind = self.kind, id, error = %e, "Fetch failed");
                state.error = Some(e.to_string());
                state.entries.get(id).cloned()
            }
        }
    }

    /// Store `value` as the entry for `id`.
    pub fn upsert(&self, id: &str, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let mut state = self.state.lock();
        state.bump(id);
        state.entries.insert(id.to_string(), value.clone());
        value
    }

    /// Run a reducer against the current entry. When it yields a value the
    /// entry is replaced and the revision bumped; `None` leaves everything
    /// as it was.
    pub fn update<F>(&self, id: &str, reduce: F) -> Option<Arc<T>>
    where
        F: FnOnce(Option<&T>) -> Option<T>,
    {
        let mut state = self.state.lock();
        let next = Arc::new(reduce(state.entries.get(id).map(Arc::as_ref))?);
        state.bump(id);
        state.entries.insert(id.to_string(), next.clone());
        Some(next)
    }

    /// Drop the entry. Clears `current` if it pointed here.
    pub fn remove(&self, id: &str) -> Option<Arc<T>> {
        let mut state = self.state.lock();
        state.bump(id);
        if state.current.as_deref() == Some(id) {
            state.current = None;
        }
        state.entries.remove(id)
    }

    /// Forget every entry and flag. In-flight fetches are superseded.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let ids: Vec<String> = state.pending.keys().cloned().collect();
        for id in &ids {
            state.bump(id);
        }
        state.entries.clear();
        state.saving.clear();
        state.current = None;
        state.error = None;
    }

    pub fn set_current(&self, id: Option<&str>) {
        self.state.lock().current = id.map(str::to_string);
    }

    pub fn current_id(&self) -> Option<String> {
        self.state.lock().current.clone()
    }

    /// Entry `current` points at, if it is cached.
    pub fn current(&self) -> Option<Arc<T>> {
        let state = self.state.lock();
        state
            .current
            .as_deref()
            .and_then(|id| state.entries.get(id))
            .cloned()
    }

    /// True while any fetch is in flight.
    pub fn is_loading(&self) -> bool {
        !self.state.lock().pending.is_empty()
    }

    pub fn is_fetching(&self, id: &str) -> bool {
        self.state.lock().pending.contains_key(id)
    }

    pub fn is_saving(&self, id: &str) -> bool {
        self.state.lock().saving.contains(id)
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn values(&self) -> Vec<Arc<T>> {
        self.state.lock().entries.values().cloned().collect()
    }

    /// Optimistic-update slot for one entry.
    pub fn slot<'a>(&'a self, id: &'a str) -> EntrySlot<'a, T> {
        EntrySlot { cache: self, id }
    }
}

/// [`OptimisticSlot`] over a single cache entry.
pub struct EntrySlot<'a, T> {
    cache: &'a ResourceCache<T>,
    id: &'a str,
}

impl<T> OptimisticSlot<T> for EntrySlot<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    fn snapshot(&self) -> Option<T> {
        self.cache.get(self.id).map(|entry| entry.as_ref().clone())
    }

    fn replace(&self, value: T) {
        self.cache.upsert(self.id, value);
    }

    fn begin(&self) {
        let mut state = self.cache.state.lock();
        state.saving.insert(self.id.to_string());
        state.error = None;
    }

    fn finish(&self, error: Option<String>) {
        let mut state = self.cache.state.lock();
        state.saving.remove(self.id);
        if error.is_some() {
            state.error = error;
        }
    }
}
