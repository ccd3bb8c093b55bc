//! Push-channel connection manager.
//!
//! Owns one authenticated connection to the push server. `connect()`
//! resolves only once the server has acknowledged the handshake with a
//! `connected` event. After that a session task reads frames, decodes them
//! into [`ServerEvent`]s and hands them to the [`EventRegistry`].
//!
//! ## Reconnection
//!
//! When the transport drops without a local `disconnect()`, the session
//! task fires a `disconnect` event, detaches every handler, and retries
//! with exponential backoff up to `reconnect.max_attempts`. Each successful
//! reconnect re-attaches each registered handler exactly once. When the
//! attempts run out the state stays disconnected with `error` set; nothing
//! retries after that until the caller invokes `connect()` again.
//!
//! ## Cancellation
//!
//! Every `disconnect()` bumps a generation counter. Connect attempts and
//! session tasks carry the generation they started under and stop touching
//! shared state once it no longer matches.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::event::{ClientEvent, ConnectedPayload, ErrorPayload, ServerEvent, names};
use crate::registry::{EventRegistry, Handler};
use crate::session::SessionProvider;
use crate::transport::{Channel, Connector, OpenRequest};
use crate::wire::Frame;

/// Observable connection status. Starts (and resets to) the default:
/// disconnected, not connecting, no error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub is_connecting: bool,
    pub error: Option<String>,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub socket_id: Option<String>,
    /// Consecutive failed attempts in the current connect/reconnect cycle.
    pub reconnect_attempts: u32,
}

/// A transport that completed the handshake.
struct Established {
    outgoing: mpsc::Sender<Frame>,
    incoming: mpsc::Receiver<Frame>,
    connected: ConnectedPayload,
}

#[derive(Default)]
struct Link {
    outgoing: Option<mpsc::Sender<Frame>>,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    config: SyncConfig,
    connector: Arc<dyn Connector>,
    session: Arc<dyn SessionProvider>,
    registry: EventRegistry,
    state_tx: watch::Sender<ConnectionState>,
    generation_tx: watch::Sender<u64>,
    link: Mutex<Link>,
    connect_lock: tokio::sync::Mutex<()>,
}

/// Handle to the push channel. Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(
        config: SyncConfig,
        connector: Arc<dyn Connector>,
        session: Arc<dyn SessionProvider>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::default());
        let (generation_tx, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                session,
                registry: EventRegistry::new(),
                state_tx,
                generation_tx,
                link: Mutex::new(Link::default()),
                connect_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Open the push channel and wait for the server's acknowledgement.
    ///
    /// No-op when already connected, and in demo mode. Concurrent callers
    /// queue behind the attempt in progress and then observe its outcome.
    /// That includes an automatic reconnect: a caller arriving while the
    /// session task is re-establishing waits for it instead of opening a
    /// second transport.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        if self.inner.config.demo_mode {
            tracing::info!("Demo mode: push channel disabled");
            return Ok(());
        }

        let _guard = self.inner.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let generation = self.inner.generation();
        self.inner.update_state(|s| {
            s.is_connecting = true;
            s.error = None;
            s.reconnect_attempts = 0;
        });

        match self.inner.establish_with_timeout(generation).await {
            Ok(established) => {
                if Inner::go_live(&self.inner, generation, established) {
                    Ok(())
                } else {
                    self.inner.update_state(|s| s.is_connecting = false);
                    Err(SyncError::Cancelled)
                }
            }
            Err(SyncError::Cancelled) => {
                tracing::debug!("Connect cancelled by local disconnect");
                Err(SyncError::Cancelled)
            }
            Err(e) => {
                tracing::warn!(error = %e, url = %self.inner.config.socket_url, "Push channel connect failed");
                if self.inner.generation() == generation {
                    self.inner.update_state(|s| {
                        s.is_connected = false;
                        s.is_connecting = false;
                        s.error = Some(e.to_string());
                    });
                }
                Err(e)
            }
        }
    }

    /// Close the connection, detach every handler, and reset the state.
    /// Idempotent. Cancels an in-flight `connect()`.
    pub fn disconnect(&self) {
        let link = {
            let mut link = self.inner.link.lock();
            self.inner.generation_tx.send_modify(|g| *g += 1);
            std::mem::take(&mut *link)
        };
        let had_connection = link.outgoing.is_some() || link.task.is_some();
        if let Some(task) = link.task {
            task.abort();
        }
        drop(link.outgoing);
        self.inner.registry.detach_all();
        self.inner.state_tx.send_replace(ConnectionState::default());
        if had_connection {
            tracing::info!("Push channel disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state_tx.borrow().is_connected
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state_tx.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.inner.registry
    }

    pub fn on(&self, event: &str, handler: &Handler) -> bool {
        self.inner.registry.on(event, handler)
    }

    pub fn off(&self, event: &str, handler: Option<&Handler>) {
        self.inner.registry.off(event, handler)
    }

    /// Send a client event over the live connection.
    pub async fn emit(&self, event: ClientEvent) -> Result<()> {
        let frame = Frame::from_client_event(&event)?;
        let outgoing = self.inner.link.lock().outgoing.clone();
        let Some(outgoing) = outgoing else {
            return Err(SyncError::NotConnected);
        };
        outgoing
            .send(frame)
            .await
            .map_err(|_| SyncError::NotConnected)
    }
}

impl Inner {
    fn generation(&self) -> u64 {
        *self.generation_tx.borrow()
    }

    fn update_state(&self, f: impl FnOnce(&mut ConnectionState)) {
        self.state_tx.send_modify(f);
    }

    /// Resolves once `disconnect()` moved the generation past `generation`.
    async fn cancelled(&self, generation: u64) {
        let mut rx = self.generation_tx.subscribe();
        loop {
            let current = *rx.borrow_and_update();
            if current != generation {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    async fn establish_with_timeout(&self, generation: u64) -> Result<Established> {
        let timeout = self.config.connect_timeout;
        match tokio::time::timeout(timeout, self.establish(generation)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(timeout)),
        }
    }

    /// Try to open and authenticate, retrying transport failures with
    /// backoff. An `error` frame from the server is final.
    async fn establish(&self, generation: u64) -> Result<Established> {
        let policy = &self.config.reconnect;
        let mut attempt = 0u32;
        loop {
            let outcome = tokio::select! {
                outcome = self.attempt() => outcome,
                _ = self.cancelled(generation) => return Err(SyncError::Cancelled),
            };
            let err = match outcome {
                Ok(established) => return Ok(established),
                Err(e @ SyncError::AuthRejected { .. }) => return Err(e),
                Err(e) => e,
            };

            attempt += 1;
            self.update_state(|s| s.reconnect_attempts = attempt);
            if attempt >= policy.max_attempts {
                return Err(err);
            }
            let delay = policy.jittered_delay(attempt);
            tracing::warn!(
                error = %err,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Push channel attempt failed, retrying"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancelled(generation) => return Err(SyncError::Cancelled),
            }
        }
    }

    /// One open + handshake.
    async fn attempt(&self) -> Result<Established> {
        let token = match self.session.bearer_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::debug!(error = %e, "No bearer token, falling back to cookie auth");
                None
            }
        };
        let request = OpenRequest {
            url: self.config.socket_url.clone(),
            token: token.clone(),
            cookie: self.config.cookie.clone(),
        };
        let Channel {
            outgoing,
            mut incoming,
        } = self.connector.open(request).await?;

        outgoing
            .send(Frame::handshake(token.as_deref()))
            .await
            .map_err(|_| SyncError::Connection("transport closed during handshake".into()))?;

        loop {
            let Some(frame) = incoming.recv().await else {
                return Err(SyncError::Connection(
                    "connection closed before acknowledgement".into(),
                ));
            };
            match frame.event.as_str() {
                names::CONNECTED => {
                    let connected: ConnectedPayload = serde_json::from_value(frame.data)
                        .map_err(|e| SyncError::Protocol(format!("bad connected payload: {e}")))?;
                    return Ok(Established {
                        outgoing,
                        incoming,
                        connected,
                    });
                }
                names::ERROR => {
                    let payload: ErrorPayload =
                        serde_json::from_value(frame.data).unwrap_or_default();
                    return Err(SyncError::AuthRejected {
                        code: payload.code,
                        message: payload.message,
                    });
                }
                other => tracing::debug!(event = other, "Ignoring frame before acknowledgement"),
            }
        }
    }

    /// Install an established transport as the live connection and start
    /// its session task. Returns `false` if a disconnect got there first.
    fn go_live(this: &Arc<Self>, generation: u64, established: Established) -> bool {
        let Established {
            outgoing,
            incoming,
            connected,
        } = established;
        let mut link = this.link.lock();
        if this.generation() != generation {
            return false;
        }
        let bound = this.registry.attach_all();
        link.outgoing = Some(outgoing);
        this.mark_connected(&connected);
        tracing::info!(socket_id = %connected.socket_id, handlers = bound, "Push channel connected");
        let session = tokio::spawn(run_session(this.clone(), generation, incoming, connected));
        // A session task left over from a lost connection must not keep
        // reconnecting behind the new one.
        if let Some(previous) = link.task.replace(session) {
            previous.abort();
        }
        true
    }

    fn mark_connected(&self, connected: &ConnectedPayload) {
        self.update_state(|s| {
            s.is_connected = true;
            s.is_connecting = false;
            s.error = None;
            s.last_connected_at = Some(Utc::now());
            s.socket_id = Some(connected.socket_id.clone());
            s.reconnect_attempts = 0;
        });
    }

    fn handle_frame(&self, frame: Frame) {
        let Frame { event: name, data } = frame;
        match ServerEvent::decode(&name, data) {
            Ok(Some(event)) => {
                if let ServerEvent::Error(payload) = &event {
                    tracing::warn!(code = ?payload.code, message = ?payload.message, "Server error event");
                    let message = payload.message.clone();
                    self.update_state(|s| s.error = message);
                }
                self.registry.dispatch(&event);
            }
            Ok(None) => tracing::debug!(event = %name, "Ignoring unknown event"),
            Err(e) => tracing::warn!(event = %name, error = %e, "Dropping malformed event"),
        }
    }

    /// The transport closed underneath a live session.
    fn connection_lost(&self, generation: u64, reason: &str) -> bool {
        {
            let mut link = self.link.lock();
            if self.generation() != generation {
                return false;
            }
            link.outgoing = None;
        }
        self.registry.dispatch(&ServerEvent::Disconnect {
            reason: reason.to_string(),
        });
        self.registry.detach_all();
        self.update_state(|s| {
            s.is_connected = false;
            s.is_connecting = true;
            s.socket_id = None;
            s.error = Some(reason.to_string());
        });
        true
    }

    /// Re-establish after an unexpected drop. On success the new outgoing
    /// half is installed and handlers are re-attached.
    ///
    /// Holds `connect_lock` for the whole cycle so `connect()` callers wait
    /// on it rather than racing it.
    async fn reconnect(
        &self,
        generation: u64,
    ) -> Option<(mpsc::Receiver<Frame>, ConnectedPayload)> {
        let _guard = tokio::select! {
            guard = self.connect_lock.lock() => guard,
            _ = self.cancelled(generation) => return None,
        };
        if self.state_tx.borrow().is_connected {
            // A `connect()` got in first and owns the live transport now.
            return None;
        }
        let delay = self.config.reconnect.jittered_delay(1);
        tracing::info!(delay_ms = delay.as_millis() as u64, "Push channel lost, will reconnect");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.cancelled(generation) => return None,
        }

        match self.establish_with_timeout(generation).await {
            Ok(Established {
                outgoing,
                incoming,
                connected,
            }) => {
                let bound = {
                    let mut link = self.link.lock();
                    if self.generation() != generation {
                        return None;
                    }
                    link.outgoing = Some(outgoing);
                    self.registry.attach_all()
                };
                self.mark_connected(&connected);
                tracing::info!(socket_id = %connected.socket_id, handlers = bound, "Push channel reconnected");
                Some((incoming, connected))
            }
            Err(SyncError::Cancelled) => None,
            Err(e) => {
                if self.generation() == generation {
                    tracing::error!(error = %e, "Push channel reconnect gave up");
                    self.update_state(|s| {
                        s.is_connected = false;
                        s.is_connecting = false;
                        s.error = Some(format!("reconnect failed: {e}"));
                    });
                }
                None
            }
        }
    }
}

/// Reads frames for one live connection, and for its reconnects.
async fn run_session(
    inner: Arc<Inner>,
    generation: u64,
    mut incoming: mpsc::Receiver<Frame>,
    mut connected: ConnectedPayload,
) {
    loop {
        inner.registry.dispatch(&ServerEvent::Connected(connected));

        while let Some(frame) = incoming.recv().await {
            inner.handle_frame(frame);
        }

        if !inner.connection_lost(generation, "transport closed") {
            return;
        }
        match inner.reconnect(generation).await {
            Some((next_incoming, next_connected)) => {
                incoming = next_incoming;
                connected = next_connected;
            }
            None => return,
        }
    }
}
