//! In-process connector. Each `open` hands the server half of a fresh
//! channel pair to a [`MemoryServer`], which plays the push backend in
//! tests and demo runs.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use super::{Channel, Connector, OpenRequest};
use crate::error::{Result, SyncError};
use crate::event::names;
use crate::wire::Frame;

const CHANNEL_CAPACITY: usize = 1024;

struct Shared {
    refusals: Mutex<VecDeque<String>>,
    opens: AtomicUsize,
    accepted: mpsc::UnboundedSender<ServerSide>,
}

/// Client half: implements [`Connector`].
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

/// Server half: yields one [`ServerSide`] per successful `open`.
pub struct MemoryServer {
    shared: Arc<Shared>,
    accepted: mpsc::UnboundedReceiver<ServerSide>,
}

impl MemoryConnector {
    pub fn pair() -> (MemoryConnector, MemoryServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            refusals: Mutex::new(VecDeque::new()),
            opens: AtomicUsize::new(0),
            accepted: tx,
        });
        (
            MemoryConnector {
                shared: shared.clone(),
            },
            MemoryServer {
                shared,
                accepted: rx,
            },
        )
    }
}

impl Connector for MemoryConnector {
    fn open(&self, request: OpenRequest) -> BoxFuture<'static, Result<Channel>> {
        let shared = self.shared.clone();
        Box::pin(async move {
            shared.opens.fetch_add(1, Ordering::SeqCst);
            if let Some(reason) = shared.refusals.lock().pop_front() {
                return Err(SyncError::Connection(reason));
            }
            let (to_client, incoming) = mpsc::channel(CHANNEL_CAPACITY);
            let (outgoing, from_client) = mpsc::channel(CHANNEL_CAPACITY);
            shared
                .accepted
                .send(ServerSide {
                    request,
                    to_client,
                    from_client,
                })
                .map_err(|_| SyncError::Connection("memory server dropped".into()))?;
            Ok(Channel { outgoing, incoming })
        })
    }
}

impl MemoryServer {
    /// Wait for the next opened connection.
    pub async fn accept(&mut self) -> Option<ServerSide> {
        self.accepted.recv().await
    }

    /// Make the next `n` opens fail with `reason`.
    pub fn refuse_next(&self, n: usize, reason: &str) {
        let mut refusals = self.shared.refusals.lock();
        for _ in 0..n {
            refusals.push_back(reason.to_string());
        }
    }

    /// Number of open attempts so far, refused ones included.
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }
}

/// Server end of one connection. Dropping it closes the connection.
pub struct ServerSide {
    pub request: OpenRequest,
    to_client: mpsc::Sender<Frame>,
    from_client: mpsc::Receiver<Frame>,
}

impl ServerSide {
    /// Next frame from the client, or `None` once the client hung up.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_client.recv().await
    }

    /// Read the handshake frame and return its token.
    pub async fn expect_handshake(&mut self) -> Result<Option<String>> {
        match self.recv().await {
            Some(frame) if frame.event == names::HANDSHAKE => {
                Ok(frame.auth_token().map(str::to_string))
            }
            Some(frame) => Err(SyncError::Protocol(format!(
                "expected handshake, got {}",
                frame.event
            ))),
            None => Err(SyncError::Connection("client hung up".into())),
        }
    }

    pub async fn emit(&self, event: &str, data: Value) -> Result<()> {
        self.to_client
            .send(Frame::new(event, data))
            .await
            .map_err(|_| SyncError::NotConnected)
    }

    /// Complete the handshake with a `connected` acknowledgement.
    pub async fn accept_handshake(&mut self, socket_id: &str) -> Result<Option<String>> {
        let token = self.expect_handshake().await?;
        self.emit(names::CONNECTED, json!({ "socketId": socket_id }))
            .await?;
        Ok(token)
    }
}
