//! Who is online. Cleared when the push channel drops, since nothing keeps
//! the set current while disconnected.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::event::{ServerEvent, names};
use crate::registry::{EventRegistry, handler};
use crate::store::{Listeners, SocketListeners};

#[derive(Clone, Default)]
pub struct PresenceStore {
    online: Arc<Mutex<BTreeSet<String>>>,
    listeners: Listeners,
}

impl PresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online.lock().contains(user_id)
    }

    pub fn online_users(&self) -> Vec<String> {
        self.online.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.online.lock().clear();
    }

    fn apply(&self, event: &ServerEvent) {
        let mut online = self.online.lock();
        match event {
            ServerEvent::UserOnline(u) => {
                online.insert(u.user_id.clone());
            }
            ServerEvent::UserOffline(u) => {
                online.remove(&u.user_id);
            }
            ServerEvent::Disconnect { .. } => online.clear(),
            _ => {}
        }
    }
}

impl SocketListeners for PresenceStore {
    fn setup_socket_listeners(&self, registry: &EventRegistry) {
        let store = self.clone();
        let on_event = handler(move |event| store.apply(event));
        self.listeners.install(
            registry,
            vec![
                (names::USER_ONLINE, on_event.clone()),
                (names::USER_OFFLINE, on_event.clone()),
                (names::DISCONNECT, on_event),
            ],
        );
    }

    fn remove_socket_listeners(&self) {
        self.listeners.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::UserRef;

    fn user(id: &str) -> UserRef {
        UserRef { user_id: id.into() }
    }

    #[test]
    fn tracks_online_and_offline() {
        let store = PresenceStore::new();
        let registry = EventRegistry::new();
        store.setup_socket_listeners(&registry);
        registry.attach_all();

        registry.dispatch(&ServerEvent::UserOnline(user("agent-2")));
        registry.dispatch(&ServerEvent::UserOnline(user("agent-1")));
        registry.dispatch(&ServerEvent::UserOffline(user("agent-2")));
        assert_eq!(store.online_users(), vec!["agent-1".to_string()]);

        registry.dispatch(&ServerEvent::Disconnect {
            reason: "transport closed".into(),
        });
        assert!(!store.is_online("agent-1"));
    }

    #[test]
    fn removed_listeners_stop_updates() {
        let store = PresenceStore::new();
        let registry = EventRegistry::new();
        store.setup_socket_listeners(&registry);
        registry.attach_all();
        store.remove_socket_listeners();
        registry.dispatch(&ServerEvent::UserOnline(user("agent-3")));
        assert!(store.online_users().is_empty());
    }
}
