//! Event registry: who wants which event, independent of whether a
//! connection currently exists.
//!
//! Handlers are registered per event name and identified by `Arc` pointer,
//! so registering the same handler twice is a no-op. A parallel *attached*
//! set tracks which handlers are bound to the live connection; only attached
//! handlers receive dispatches. The connection manager calls
//! [`attach_all`](EventRegistry::attach_all) after every successful
//! (re)connect and [`detach_all`](EventRegistry::detach_all) when the
//! connection goes away.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::event::ServerEvent;

/// Subscriber callback.
pub type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Wrap a closure as a [`Handler`]. Keep the returned `Arc` to `off` it later.
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&ServerEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Default)]
struct RegistryState {
    live: bool,
    registered: HashMap<String, Vec<Handler>>,
    attached: HashMap<String, Vec<Handler>>,
}

fn contains(list: &[Handler], handler: &Handler) -> bool {
    list.iter().any(|h| Arc::ptr_eq(h, handler))
}

fn remove(map: &mut HashMap<String, Vec<Handler>>, name: &str, handler: &Handler) {
    if let Some(list) = map.get_mut(name) {
        list.retain(|h| !Arc::ptr_eq(h, handler));
        if list.is_empty() {
            map.remove(name);
        }
    }
}

/// Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct EventRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `name`. Binds it right away when a connection
    /// is live. Returns `false` if it was already registered.
    pub fn on(&self, name: &str, handler: &Handler) -> bool {
        let mut state = self.state.lock();
        let registered = state.registered.entry(name.to_string()).or_default();
        if contains(registered, handler) {
            return false;
        }
        registered.push(handler.clone());
        if state.live {
            let attached = state.attached.entry(name.to_string()).or_default();
            if !contains(attached, handler) {
                attached.push(handler.clone());
            }
        }
        true
    }

    /// Remove one handler, or every handler for `name` when `handler` is `None`.
    pub fn off(&self, name: &str, handler: Option<&Handler>) {
        let mut state = self.state.lock();
        match handler {
            Some(handler) => {
                remove(&mut state.registered, name, handler);
                remove(&mut state.attached, name, handler);
            }
            None => {
                state.registered.remove(name);
                state.attached.remove(name);
            }
        }
    }

    /// Bind every registered handler not yet attached. Returns how many
    /// were newly bound.
    pub(crate) fn attach_all(&self) -> usize {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.live = true;
        let mut bound = 0;
        for (name, handlers) in &state.registered {
            let attached = state.attached.entry(name.clone()).or_default();
            for handler in handlers {
                if !contains(attached, handler) {
                    attached.push(handler.clone());
                    bound += 1;
                }
            }
        }
        bound
    }

    /// Forget all bindings to the (now gone) connection. Registrations stay.
    pub(crate) fn detach_all(&self) {
        let mut state = self.state.lock();
        state.live = false;
        state.attached.clear();
    }

    /// Deliver `event` to each attached handler for its name, in
    /// registration order. Handlers run outside the registry lock, so they
    /// may call `on`/`off` themselves. Returns the number of handlers invoked.
    pub fn dispatch(&self, event: &ServerEvent) -> usize {
        let handlers: Vec<Handler> = self
            .state
            .lock()
            .attached
            .get(event.name())
            .cloned()
            .unwrap_or_default();
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn handler_count(&self, name: &str) -> usize {
        self.state.lock().registered.get(name).map_or(0, Vec::len)
    }

    pub fn attached_count(&self, name: &str) -> usize {
        self.state.lock().attached.get(name).map_or(0, Vec::len)
    }

    pub fn is_live(&self) -> bool {
        self.state.lock().live
    }
}
