//! The sync service: one connection manager plus every domain store, with
//! an explicit lifecycle.
//!
//! `init()` registers each store's push handlers and opens the push channel;
//! calling it again only retries the connection. `dispose()` unregisters
//! everything, closes the channel and empties the stores. Separate instances
//! share nothing.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::api::{ApiClient, HttpApiClient};
use crate::config::SyncConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::Result;
use crate::session::SessionProvider;
use crate::store::{
    ChatStore, DocumentStore, NotificationStore, PresenceStore, ReportStore, SettingsStore,
    SocketListeners, TransactionStore,
};
use crate::transport::{Connector, WsConnector};

pub struct SyncService {
    connection: ConnectionManager,
    reports: ReportStore,
    transactions: TransactionStore,
    documents: DocumentStore,
    notifications: NotificationStore,
    chat: ChatStore,
    presence: PresenceStore,
    settings: SettingsStore,
    initialized: Mutex<bool>,
}

impl SyncService {
    pub fn new(
        config: SyncConfig,
        connector: Arc<dyn Connector>,
        session: Arc<dyn SessionProvider>,
        api: Arc<dyn ApiClient>,
    ) -> Self {
        let connection = ConnectionManager::new(config, connector, session);
        Self {
            reports: ReportStore::new(api.clone()),
            transactions: TransactionStore::new(api.clone()),
            documents: DocumentStore::new(api.clone()),
            notifications: NotificationStore::new(api.clone()),
            chat: ChatStore::new(connection.clone()),
            presence: PresenceStore::new(),
            settings: SettingsStore::new(api),
            connection,
            initialized: Mutex::new(false),
        }
    }

    /// WebSocket transport plus HTTP API, both from `config`.
    pub fn connect_to(config: SyncConfig, session: Arc<dyn SessionProvider>) -> Result<Self> {
        let api = HttpApiClient::new(&config.api_url, session.clone())?;
        Ok(Self::new(
            config,
            Arc::new(WsConnector::new()),
            session,
            Arc::new(api),
        ))
    }

    fn listeners(&self) -> [&dyn SocketListeners; 6] {
        [
            &self.reports,
            &self.transactions,
            &self.documents,
            &self.notifications,
            &self.chat,
            &self.presence,
        ]
    }

    /// Register push handlers (once) and connect.
    pub async fn init(&self) -> Result<()> {
        {
            let mut initialized = self.initialized.lock();
            if !*initialized {
                let registry = self.connection.registry();
                for store in self.listeners() {
                    store.setup_socket_listeners(registry);
                }
                *initialized = true;
                tracing::debug!("Sync service listeners installed");
            }
        }
        self.connection.connect().await
    }

    /// Tear down listeners and the connection, and drop cached state.
    pub fn dispose(&self) {
        let mut initialized = self.initialized.lock();
        for store in self.listeners() {
            store.remove_socket_listeners();
        }
        self.connection.disconnect();
        self.reports.clear();
        self.transactions.clear();
        self.documents.clear();
        self.notifications.clear();
        self.chat.clear();
        self.presence.clear();
        self.settings.clear();
        if *initialized {
            tracing::info!("Sync service disposed");
        }
        *initialized = false;
    }

    pub fn is_initialized(&self) -> bool {
        *self.initialized.lock()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn reports(&self) -> &ReportStore {
        &self.reports
    }

    pub fn transactions(&self) -> &TransactionStore {
        &self.transactions
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn notifications(&self) -> &NotificationStore {
        &self.notifications
    }

    pub fn chat(&self) -> &ChatStore {
        &self.chat
    }

    pub fn presence(&self) -> &PresenceStore {
        &self.presence
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        for store in self.listeners() {
            store.remove_socket_listeners();
        }
        self.connection.disconnect();
    }
}
