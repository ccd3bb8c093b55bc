//! Transports that carry [`Frame`]s between the client and the push server.
//!
//! A [`Connector`] opens one duplex [`Channel`]; the connection manager owns
//! the handshake and everything above it. Both ends of a channel are plain
//! mpsc queues so the protocol logic never touches sockets directly.

pub mod memory;
pub mod ws;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::wire::Frame;

pub use memory::{MemoryConnector, MemoryServer, ServerSide};
pub use ws::WsConnector;

/// Parameters for opening a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub url: String,
    /// Bearer token, sent in the handshake frame.
    pub token: Option<String>,
    /// Cookie header for the upgrade request, used when there is no token.
    pub cookie: Option<String>,
}

/// An open duplex connection.
///
/// `incoming` yields `None` once the remote side is gone. Dropping
/// `outgoing` closes the connection from our side.
pub struct Channel {
    pub outgoing: mpsc::Sender<Frame>,
    pub incoming: mpsc::Receiver<Frame>,
}

/// Opens transport connections.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, request: OpenRequest) -> BoxFuture<'static, Result<Channel>>;
}
