//! Notification inbox, newest first.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::api::{ApiClient, ApiResult};
use crate::event::{ServerEvent, names};
use crate::models::Notification;
use crate::optimistic::{OptimisticSlot, optimistic_update};
use crate::registry::{EventRegistry, handler};
use crate::store::{Listeners, SocketListeners};

#[derive(Default)]
struct Inbox {
    items: Vec<Notification>,
    loaded: bool,
    loading: bool,
    /// Writes in flight.
    saving: usize,
    error: Option<String>,
    /// Bumped by every push or local write.
    revision: u64,
}

impl Inbox {
    fn sort(&mut self) {
        self.items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

#[derive(Clone)]
pub struct NotificationStore {
    api: Arc<dyn ApiClient>,
    inbox: Arc<Mutex<Inbox>>,
    listeners: Listeners,
}

impl NotificationStore {
    pub fn new(api: Arc<dyn ApiClient>) -> Self {
        Self {
            api,
            inbox: Arc::new(Mutex::new(Inbox::default())),
            listeners: Listeners::default(),
        }
    }

    /// Load the inbox. Notifications pushed while the request was in flight
    /// are kept over the response's copies.
    pub async fn fetch_notifications(&self) -> Vec<Notification> {
        let started_at = {
            let mut inbox = self.inbox.lock();
            inbox.loading = true;
            inbox.error = None;
            inbox.revision
        };

        let result = self.api.list_notifications().await;

        let mut inbox = self.inbox.lock();
        inbox.loading = false;
        match result {
            Ok(fetched) => {
                if inbox.revision == started_at {
                    inbox.items = fetched;
                } else {
                    let local: HashSet<String> = inbox.items.iter().map(|n| n.id.clone()).collect();
                    inbox
                        .items
                        .extend(fetched.into_iter().filter(|n| !local.contains(&n.id)));
                }
                inbox.loaded = true;
                inbox.sort();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Notification fetch failed");
                inbox.error = Some(e.to_string());
            }
        }
        inbox.items.clone()
    }

    /// Mark one notification read, optimistically.
    pub async fn mark_read(&self, id: &str) -> ApiResult<Option<Notification>> {
        let api = self.api.clone();
        let slot = One {
            inbox: &self.inbox,
            id,
        };
        optimistic_update(
            &slot,
            (),
            |n, _| Notification {
                read: true,
                ..n.clone()
            },
            move |(), optimistic| async move { api.mark_notification_read(&optimistic.id).await },
        )
        .await
    }

    /// Mark every loaded notification read, optimistically. Notifications
    /// pushed while the call is in flight are left as they arrived.
    pub async fn mark_all_read(&self) -> ApiResult<Option<Vec<Notification>>> {
        let api = self.api.clone();
        let slot: &dyn OptimisticSlot<ReadFlags> = &All {
            inbox: &self.inbox,
        };
        let marked = optimistic_update(
            slot,
            (),
            |flags, _| flags.keys().map(|id| (id.clone(), true)).collect(),
            move |(), optimistic| async move {
                api.mark_all_notifications_read().await.map(|()| optimistic)
            },
        )
        .await?;
        Ok(marked.map(|_| self.notifications()))
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inbox.lock().items.clone()
    }

    pub fn unread_count(&self) -> usize {
        self.inbox.lock().items.iter().filter(|n| !n.read).count()
    }

    pub fn is_loading(&self) -> bool {
        self.inbox.lock().loading
    }

    pub fn is_saving(&self) -> bool {
        self.inbox.lock().saving > 0
    }

    pub fn error(&self) -> Option<String> {
        self.inbox.lock().error.clone()
    }

    pub fn clear(&self) {
        let mut inbox = self.inbox.lock();
        let revision = inbox.revision + 1;
        *inbox = Inbox {
            revision,
            ..Inbox::default()
        };
    }

    fn apply(&self, event: &ServerEvent) {
        let mut inbox = self.inbox.lock();
        match event {
            ServerEvent::NotificationNew(n) => {
                inbox.items.retain(|existing| existing.id != n.id);
                inbox.items.push(n.clone());
                inbox.sort();
            }
            ServerEvent::NotificationRead(r) => {
                for n in inbox.items.iter_mut().filter(|n| n.id == r.notification_id) {
                    n.read = true;
                }
            }
            ServerEvent::NotificationAllRead => {
                for n in inbox.items.iter_mut() {
                    n.read = true;
                }
            }
            _ => return,
        }
        inbox.touch();
    }
}

impl SocketListeners for NotificationStore {
    fn setup_socket_listeners(&self, registry: &EventRegistry) {
        let store = self.clone();
        let on_event = handler(move |event| store.apply(event));
        self.listeners.install(
            registry,
            vec![
                (names::NOTIFICATION_NEW, on_event.clone()),
                (names::NOTIFICATION_READ, on_event.clone()),
                (names::NOTIFICATION_ALL_READ, on_event),
            ],
        );
    }

    fn remove_socket_listeners(&self) {
        self.listeners.remove();
    }
}

fn begin(inbox: &Mutex<Inbox>) {
    let mut inbox = inbox.lock();
    inbox.saving += 1;
    inbox.error = None;
}

fn finish(inbox: &Mutex<Inbox>, error: Option<String>) {
    let mut inbox = inbox.lock();
    inbox.saving = inbox.saving.saturating_sub(1);
    if error.is_some() {
        inbox.error = error;
    }
}

/// Slot over a single notification.
struct One<'a> {
    inbox: &'a Mutex<Inbox>,
    id: &'a str,
}

impl OptimisticSlot<Notification> for One<'_> {
    fn snapshot(&self) -> Option<Notification> {
        self.inbox
            .lock()
            .items
            .iter()
            .find(|n| n.id == self.id)
            .cloned()
    }

    fn replace(&self, value: Notification) {
        let mut inbox = self.inbox.lock();
        if let Some(slot) = inbox.items.iter_mut().find(|n| n.id == self.id) {
            *slot = value;
        }
        inbox.touch();
    }

    fn begin(&self) {
        begin(self.inbox);
    }

    fn finish(&self, error: Option<String>) {
        finish(self.inbox, error);
    }
}

/// Read flag per notification id.
type ReadFlags = HashMap<String, bool>;

/// Slot over the read flags of the loaded inbox; empty until the first
/// successful fetch. Writes only touch the ids they carry.
struct All<'a> {
    inbox: &'a Mutex<Inbox>,
}

impl OptimisticSlot<ReadFlags> for All<'_> {
    fn snapshot(&self) -> Option<ReadFlags> {
        let inbox = self.inbox.lock();
        inbox
            .loaded
            .then(|| inbox.items.iter().map(|n| (n.id.clone(), n.read)).collect())
    }

    fn replace(&self, flags: ReadFlags) {
        let mut inbox = self.inbox.lock();
        for n in inbox.items.iter_mut() {
            if let Some(&read) = flags.get(&n.id) {
                n.read = read;
            }
        }
        inbox.touch();
    }

    fn begin(&self) {
        begin(self.inbox);
    }

    fn finish(&self, error: Option<String>) {
        finish(self.inbox, error);
    }
}
