//! Document store and OCR processing progress.
//!
//! Progress for a document stays visible after it reaches `completed` or
//! `failed` until the document is fetched again, deleted, or the terminal
//! entry is older than the retention period.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;

use crate::api::ApiClient;
use crate::event::{ServerEvent, names};
use crate::models::{Document, DocumentPatch, DocumentProgress};
use crate::registry::{EventRegistry, handler};
use crate::store::cache::ResourceCache;
use crate::store::{Listeners, SocketListeners};

/// How long a `completed`/`failed` entry stays when nothing fetches or
/// deletes its document.
pub const TERMINAL_PROGRESS_RETENTION: Duration = Duration::from_secs(10 * 60);

struct Tracked {
    progress: DocumentProgress,
    /// Set once the stage is terminal.
    settled_at: Option<Instant>,
}

#[derive(Clone)]
pub struct DocumentStore {
    api: Arc<dyn ApiClient>,
    cache: ResourceCache<Document>,
    progress: Arc<Mutex<HashMap<String, Tracked>>>,
    retention: Duration,
    listeners: Listeners,
}

impl DocumentStore {
    pub fn new(api: Arc<dyn ApiClient>) -> Self {
        Self {
            api,
            cache: ResourceCache::new("document"),
            progress: Arc::new(Mutex::new(HashMap::new())),
            retention: TERMINAL_PROGRESS_RETENTION,
            listeners: Listeners::default(),
        }
    }

    /// Override how long terminal progress is kept.
    pub fn with_terminal_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub async fn fetch_document(&self, id: &str) -> Option<Arc<Document>> {
        let api = self.api.clone();
        let document = self
            .cache
            .fetch_with(id, false, move |id| async move { api.get_document(&id).await })
            .await?;
        let mut progress = self.progress.lock();
        if progress.get(id).is_some_and(|t| t.progress.is_terminal()) {
            progress.remove(id);
        }
        Some(document)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Document>> {
        self.cache.get(id)
    }

    pub fn for_transaction(&self, transaction_id: &str) -> Vec<Arc<Document>> {
        let mut docs: Vec<_> = self
            .cache
            .values()
            .into_iter()
            .filter(|d| d.transaction_id == transaction_id)
            .collect();
        docs.sort_by(|a, b| a.name.cmp(&b.name));
        docs
    }

    pub fn progress(&self, id: &str) -> Option<DocumentProgress> {
        self.progress.lock().get(id).map(|t| t.progress.clone())
    }

    /// Documents still being processed.
    pub fn processing(&self) -> Vec<DocumentProgress> {
        let mut active: Vec<_> = self
            .progress
            .lock()
            .values()
            .filter(|t| !t.progress.is_terminal())
            .map(|t| t.progress.clone())
            .collect();
        active.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        active
    }

    pub fn is_loading(&self) -> bool {
        self.cache.is_loading()
    }

    pub fn error(&self) -> Option<String> {
        self.cache.error()
    }

    pub fn clear(&self) {
        self.cache.clear();
        self.progress.lock().clear();
    }

    fn reduce(&self, id: &str, patch: DocumentPatch) -> Option<Arc<Document>> {
        let now = Utc::now();
        self.cache.update(id, |existing| match existing {
            Some(doc) => Some(doc.merged(patch, now)),
            None => Document::from_patch(id, patch, now),
        })
    }

    fn apply(&self, event: &ServerEvent) {
        match event {
            ServerEvent::DocumentProgress(p) => {
                tracing::trace!(id = %p.document_id, stage = %p.stage, progress = p.progress, "Document progress");
                let now = Instant::now();
                let mut progress = self.progress.lock();
                let retention = self.retention;
                progress.retain(|_, t| {
                    t.settled_at
                        .is_none_or(|settled| now.duration_since(settled) < retention)
                });
                progress.insert(
                    p.document_id.clone(),
                    Tracked {
                        progress: p.clone(),
                        settled_at: p.is_terminal().then_some(now),
                    },
                );
            }
            ServerEvent::DocumentUpdated(e) => {
                self.reduce(&e.document_id, e.changes.clone());
            }
            ServerEvent::DocumentStatus(e) => {
                let patch = DocumentPatch {
                    status: Some(e.status.clone()),
                    error: e.error.clone(),
                    ..Default::default()
                };
                if self.reduce(&e.document_id, patch).is_none() {
                    tracing::debug!(id = %e.document_id, status = %e.status, "Status for uncached document");
                }
            }
            ServerEvent::DocumentDeleted(e) => {
                self.cache.remove(&e.document_id);
                self.progress.lock().remove(&e.document_id);
            }
            _ => {}
        }
    }
}

impl SocketListeners for DocumentStore {
    fn setup_socket_listeners(&self, registry: &EventRegistry) {
        let store = self.clone();
        let on_event = handler(move |event| store.apply(event));
        self.listeners.install(
            registry,
            vec![
                (names::DOCUMENT_PROGRESS, on_event.clone()),
                (names::DOCUMENT_UPDATED, on_event.clone()),
                (names::DOCUMENT_STATUS, on_event.clone()),
                (names::DOCUMENT_DELETED, on_event),
            ],
        );
    }

    fn remove_socket_listeners(&self) {
        self.listeners.remove();
    }
}
