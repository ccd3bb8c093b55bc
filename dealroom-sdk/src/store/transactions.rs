//! Transaction pipeline store.

use std::sync::Arc;

use chrono::Utc;

use crate::api::ApiClient;
use crate::event::{ServerEvent, names};
use crate::models::{Transaction, TransactionPatch};
use crate::registry::{EventRegistry, handler};
use crate::store::cache::ResourceCache;
use crate::store::{Listeners, SocketListeners};

#[derive(Clone)]
pub struct TransactionStore {
    api: Arc<dyn ApiClient>,
    cache: ResourceCache<Transaction>,
    listeners: Listeners,
}

impl TransactionStore {
    pub fn new(api: Arc<dyn ApiClient>) -> Self {
        Self {
            api,
            cache: ResourceCache::new("transaction"),
            listeners: Listeners::default(),
        }
    }

    pub async fn fetch_transaction(&self, id: &str) -> Option<Arc<Transaction>> {
        let api = self.api.clone();
        self.cache
            .fetch_with(id, false, move |id| async move {
                api.get_transaction(&id).await
            })
            .await
    }

    pub fn get(&self, id: &str) -> Option<Arc<Transaction>> {
        self.cache.get(id)
    }

    /// All cached transactions in one pipeline column.
    pub fn by_status(&self, status: &str) -> Vec<Arc<Transaction>> {
        let mut matching: Vec<_> = self
            .cache
            .values()
            .into_iter()
            .filter(|t| t.status == status)
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        matching
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.cache.is_loading()
    }

    pub fn error(&self) -> Option<String> {
        self.cache.error()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    fn apply_patch(&self, id: &str, patch: TransactionPatch) -> Option<Arc<Transaction>> {
        let now = Utc::now();
        self.cache.update(id, |existing| match existing {
            Some(txn) => Some(txn.merged(patch, now)),
            None => Transaction::from_patch(id, patch, now),
        })
    }

    fn apply(&self, event: &ServerEvent) {
        match event {
            ServerEvent::TransactionCreated(e) => {
                let txn = e.transaction.clone();
                let id = txn.id.clone();
                self.cache.upsert(&id, txn);
            }
            ServerEvent::TransactionUpdated(e) => {
                if self.apply_patch(&e.transaction_id, e.changes.clone()).is_none() {
                    tracing::debug!(id = %e.transaction_id, "Update for uncached transaction ignored");
                }
            }
            ServerEvent::TransactionDeleted(e) => {
                self.cache.remove(&e.transaction_id);
            }
            _ => {}
        }
    }
}

impl SocketListeners for TransactionStore {
    fn setup_socket_listeners(&self, registry: &EventRegistry) {
        let store = self.clone();
        let on_event = handler(move |event| store.apply(event));
        self.listeners.install(
            registry,
            vec![
                (names::TRANSACTION_CREATED, on_event.clone()),
                (names::TRANSACTION_UPDATED, on_event.clone()),
                (names::TRANSACTION_DELETED, on_event),
            ],
        );
    }

    fn remove_socket_listeners(&self) {
        self.listeners.remove();
    }
}
