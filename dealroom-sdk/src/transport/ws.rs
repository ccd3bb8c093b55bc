//! WebSocket connector built on tokio-tungstenite.
//!
//! The socket is split and bridged to the [`Channel`] queues by two spawned
//! tasks: one encodes outgoing frames onto the socket, the other decodes
//! text messages into incoming frames.

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::protocol::Message;

use super::{Channel, Connector, OpenRequest};
use crate::error::{Result, SyncError};
use crate::wire::Frame;

const OUTGOING_CAPACITY: usize = 256;
const INCOMING_CAPACITY: usize = 4096;

/// Connects to the push server over `ws://` or `wss://`.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    fn open(&self, request: OpenRequest) -> BoxFuture<'static, Result<Channel>> {
        Box::pin(open_ws(request))
    }
}

async fn open_ws(request: OpenRequest) -> Result<Channel> {
    let mut http = request
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| SyncError::Connection(format!("invalid socket URL {}: {e}", request.url)))?;

    if request.token.is_none() {
        if let Some(cookie) = &request.cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| SyncError::Connection(format!("invalid cookie header: {e}")))?;
            http.headers_mut().insert(COOKIE, value);
        }
    }

    tracing::debug!(url = %request.url, "Opening push channel");
    let (stream, _response) = tokio_tungstenite::connect_async(http)
        .await
        .map_err(|e| SyncError::Connection(format!("WebSocket connect to {} failed: {e}", request.url)))?;
    tracing::debug!(url = %request.url, "WebSocket upgraded");

    let (mut sink, mut source) = stream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Frame>(OUTGOING_CAPACITY);
    let (in_tx, in_rx) = mpsc::channel::<Frame>(INCOMING_CAPACITY);

    // Outgoing frames → socket. Ends when every sender is dropped.
    tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let text = match frame.encode() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(event = %frame.event, error = %e, "Dropping unencodable frame");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                tracing::debug!(error = %e, "WebSocket write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Socket → incoming frames. Ends on close, error, or when the receiver is dropped.
    tokio::spawn(async move {
        while let Some(message) = source.next().await {
            match message {
                Ok(Message::Text(text)) => match Frame::decode(text.as_str()) {
                    Ok(frame) => {
                        if in_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Ignoring undecodable frame"),
                },
                Ok(Message::Close(close)) => {
                    tracing::debug!(?close, "WebSocket closed by server");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "WebSocket read failed");
                    break;
                }
            }
        }
    });

    Ok(Channel {
        outgoing: out_tx,
        incoming: in_rx,
    })
}
