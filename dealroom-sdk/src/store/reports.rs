//! Transaction report store.
//!
//! Reports are keyed by transaction id. Fetches go through the shared
//! [`ResourceCache`]; `report:*` push events reduce into it directly. Field
//! edits are optimistic and roll back when the server refuses them.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::api::{ApiClient, ApiResult};
use crate::event::{ServerEvent, names};
use crate::models::{ReportPatch, TransactionReport};
use crate::optimistic::optimistic_update;
use crate::registry::{EventRegistry, handler};
use crate::store::cache::ResourceCache;
use crate::store::{Listeners, SocketListeners};

#[derive(Clone)]
pub struct ReportStore {
    api: Arc<dyn ApiClient>,
    cache: ResourceCache<TransactionReport>,
    listeners: Listeners,
}

impl ReportStore {
    pub fn new(api: Arc<dyn ApiClient>) -> Self {
        Self {
            api,
            cache: ResourceCache::new("report"),
            listeners: Listeners::default(),
        }
    }

    /// Cached report, or one shared fetch. On success the report becomes
    /// `current`; when the backend has none (404) `current` is cleared and
    /// no error is recorded.
    pub async fn fetch_transaction_report(
        &self,
        transaction_id: &str,
    ) -> Option<Arc<TransactionReport>> {
        let api = self.api.clone();
        self.cache
            .fetch_with(transaction_id, true, move |id| async move {
                api.get_transaction_report(&id).await
            })
            .await
    }

    /// Merge a pushed report into the cache. An unknown report is created
    /// only when the patch carries both `id` and `data`.
    pub fn update_transaction_report_from_socket(
        &self,
        transaction_id: &str,
        patch: ReportPatch,
    ) -> Option<Arc<TransactionReport>> {
        let now = Utc::now();
        let updated = self.cache.update(transaction_id, |existing| match existing {
            Some(report) => Some(report.merged(patch, now)),
            None => TransactionReport::from_patch(transaction_id, patch, now),
        });
        if updated.is_none() {
            tracing::debug!(transaction_id, "Ignoring partial update for unknown report");
        }
        updated
    }

    /// Set one extracted field, optimistically.
    ///
    /// `Ok(None)` when the report is not loaded; nothing is sent then.
    pub async fn update_report_field(
        &self,
        transaction_id: &str,
        field: &str,
        value: Value,
    ) -> ApiResult<Option<TransactionReport>> {
        let api = self.api.clone();
        let txn = transaction_id.to_string();
        let mut data = Map::new();
        data.insert(field.to_string(), value);
        let patch = ReportPatch {
            data: Some(data),
            ..Default::default()
        };

        optimistic_update(
            &self.cache.slot(transaction_id),
            patch,
            |report, patch| report.merged(patch.clone(), Utc::now()),
            move |patch, _| async move { api.update_transaction_report(&txn, &patch).await },
        )
        .await
    }

    pub fn remove(&self, transaction_id: &str) -> Option<Arc<TransactionReport>> {
        self.cache.remove(transaction_id)
    }

    pub fn get(&self, transaction_id: &str) -> Option<Arc<TransactionReport>> {
        self.cache.get(transaction_id)
    }

    pub fn set_current(&self, transaction_id: Option<&str>) {
        self.cache.set_current(transaction_id);
    }

    pub fn current(&self) -> Option<Arc<TransactionReport>> {
        self.cache.current()
    }

    pub fn is_loading(&self) -> bool {
        self.cache.is_loading()
    }

    pub fn is_saving(&self, transaction_id: &str) -> bool {
        self.cache.is_saving(transaction_id)
    }

    pub fn error(&self) -> Option<String> {
        self.cache.error()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    fn apply(&self, event: &ServerEvent) {
        match event {
            ServerEvent::ReportCreated(e) | ServerEvent::ReportUpdated(e) => {
                self.update_transaction_report_from_socket(&e.transaction_id, e.report.clone());
            }
            ServerEvent::ReportDeleted(e) => {
                self.remove(&e.transaction_id);
            }
            _ => {}
        }
    }
}

impl SocketListeners for ReportStore {
    fn setup_socket_listeners(&self, registry: &EventRegistry) {
        let store = self.clone();
        let on_event = handler(move |event| store.apply(event));
        self.listeners.install(
            registry,
            vec![
                (names::REPORT_CREATED, on_event.clone()),
                (names::REPORT_UPDATED, on_event.clone()),
                (names::REPORT_DELETED, on_event),
            ],
        );
    }

    fn remove_socket_listeners(&self) {
        self.listeners.remove();
    }
}
