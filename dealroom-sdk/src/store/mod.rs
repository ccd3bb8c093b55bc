//! Domain stores: cached server state per resource, fed by REST fetches and
//! push-event reducers.

pub mod cache;
pub mod chat;
pub mod documents;
pub mod notifications;
pub mod presence;
pub mod reports;
pub mod settings;
pub mod transactions;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::registry::{EventRegistry, Handler};

pub use cache::ResourceCache;
pub use chat::ChatStore;
pub use documents::DocumentStore;
pub use notifications::NotificationStore;
pub use presence::PresenceStore;
pub use reports::ReportStore;
pub use settings::SettingsStore;
pub use transactions::TransactionStore;

/// A store that consumes push events.
pub trait SocketListeners {
    /// Register this store's handlers. Removes any previous registration
    /// first, so calling it repeatedly leaves exactly one handler per event.
    fn setup_socket_listeners(&self, registry: &EventRegistry);

    fn remove_socket_listeners(&self);
}

struct Installed {
    registry: EventRegistry,
    handlers: Vec<(&'static str, Handler)>,
}

/// Handlers a store registered, kept so they can be removed again.
#[derive(Clone, Default)]
pub(crate) struct Listeners {
    installed: Arc<Mutex<Option<Installed>>>,
}

impl Listeners {
    pub(crate) fn install(&self, registry: &EventRegistry, handlers: Vec<(&'static str, Handler)>) {
        self.remove();
        for (name, handler) in &handlers {
            registry.on(name, handler);
        }
        *self.installed.lock() = Some(Installed {
            registry: registry.clone(),
            handlers,
        });
    }

    pub(crate) fn remove(&self) {
        let Some(installed) = self.installed.lock().take() else {
            return;
        };
        for (name, handler) in &installed.handlers {
            installed.registry.off(name, Some(handler));
        }
    }
}
