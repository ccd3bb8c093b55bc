//! WebSocket connector against a real axum WebSocket server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{HeaderMap, header};
use axum::response::IntoResponse;
use axum::routing::get;
use dealroom_sdk::event::{ClientEvent, TypingSend, names};
use dealroom_sdk::transport::WsConnector;
use dealroom_sdk::{ConnectionManager, StaticSession, SyncConfig, SyncError, handler};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::timeout;

const TIMEOUT_MS: u64 = 5000;

/// What the server saw from one client.
#[derive(Debug)]
enum Seen {
    Handshake {
        token: Option<String>,
        cookie: Option<String>,
    },
    Frame(Value),
}

async fn upgrade(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(seen): State<mpsc::UnboundedSender<Seen>>,
) -> impl IntoResponse {
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    ws.on_upgrade(move |socket| session(socket, cookie, seen))
}

async fn send(socket: &mut WebSocket, event: &str, data: Value) -> bool {
    let text = json!({"event": event, "data": data}).to_string();
    socket.send(Message::Text(text.into())).await.is_ok()
}

async fn session(mut socket: WebSocket, cookie: Option<String>, seen: mpsc::UnboundedSender<Seen>) {
    let Some(Ok(Message::Text(text))) = socket.recv().await else {
        return;
    };
    let Ok(handshake) = serde_json::from_str::<Value>(text.as_str()) else {
        return;
    };
    let token = handshake["data"]["auth"]["token"].as_str().map(str::to_string);
    let revoked = token.as_deref() == Some("revoked");
    let _ = seen.send(Seen::Handshake { token, cookie });

    if revoked {
        send(&mut socket, names::ERROR, json!({"code": "UNAUTHORIZED", "message": "token revoked"})).await;
        return;
    }
    if !send(&mut socket, names::CONNECTED, json!({"socketId": "ws-1", "userId": "agent-1"})).await {
        return;
    }
    send(&mut socket, names::USER_ONLINE, json!({"userId": "agent-2"})).await;

    while let Some(Ok(msg)) = socket.recv().await {
        if let Message::Text(text) = msg {
            if let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) {
                let _ = seen.send(Seen::Frame(frame));
            }
        }
    }
}

async fn start_server() -> (String, mpsc::UnboundedReceiver<Seen>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new().route("/socket", get(upgrade)).with_state(tx);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("ws://{addr}/socket"), rx)
}

fn manager(url: String, token: Option<&str>, cookie: Option<&str>) -> ConnectionManager {
    let config = SyncConfig {
        socket_url: url,
        cookie: cookie.map(str::to_string),
        connect_timeout: Duration::from_secs(3),
        ..Default::default()
    };
    ConnectionManager::new(
        config,
        Arc::new(WsConnector::new()),
        Arc::new(StaticSession::new(token.map(str::to_string))),
    )
}

async fn next_seen(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    timeout(Duration::from_millis(TIMEOUT_MS), rx.recv())
        .await
        .expect("Timeout waiting for server")
        .expect("server gone")
}

#[tokio::test]
async fn handshake_events_and_emit_round_trip() {
    let (url, mut seen) = start_server().await;
    let conn = manager(url, Some("jwt-ws"), Some("session=ignored"));
    let online = Arc::new(AtomicUsize::new(0));
    let on_online = {
        let online = online.clone();
        handler(move |_| {
            online.fetch_add(1, Ordering::SeqCst);
        })
    };
    conn.on(names::USER_ONLINE, &on_online);

    conn.connect().await.unwrap();
    assert!(conn.is_connected());
    assert_eq!(conn.state().socket_id.as_deref(), Some("ws-1"));

    match next_seen(&mut seen).await {
        Seen::Handshake { token, cookie } => {
            assert_eq!(token.as_deref(), Some("jwt-ws"));
            assert!(cookie.is_none(), "cookie only sent without a token");
        }
        other => panic!("expected handshake, got {other:?}"),
    }

    conn.emit(ClientEvent::ChatTyping(TypingSend {
        conversation_id: "conv-1".into(),
        is_typing: true,
    }))
    .await
    .unwrap();
    match next_seen(&mut seen).await {
        Seen::Frame(frame) => {
            assert_eq!(frame["event"], names::CHAT_TYPING);
            assert_eq!(frame["data"]["conversationId"], "conv-1");
        }
        other => panic!("expected frame, got {other:?}"),
    }

    timeout(Duration::from_millis(TIMEOUT_MS), async {
        while online.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Timeout waiting for user:online");

    conn.disconnect();
    assert!(!conn.is_connected());
}

#[tokio::test]
async fn cookie_header_used_without_token() {
    let (url, mut seen) = start_server().await;
    let conn = manager(url, None, Some("session=abc123"));
    conn.connect().await.unwrap();

    match next_seen(&mut seen).await {
        Seen::Handshake { token, cookie } => {
            assert!(token.is_none());
            assert_eq!(cookie.as_deref(), Some("session=abc123"));
        }
        other => panic!("expected handshake, got {other:?}"),
    }
    conn.disconnect();
}

#[tokio::test]
async fn server_error_rejects_connect() {
    let (url, _seen) = start_server().await;
    let conn = manager(url, Some("revoked"), None);
    let err = conn.connect().await.unwrap_err();
    match err {
        SyncError::AuthRejected { code, message } => {
            assert_eq!(code.as_deref(), Some("UNAUTHORIZED"));
            assert_eq!(message.as_deref(), Some("token revoked"));
        }
        other => panic!("expected auth rejection, got {other:?}"),
    }
    assert!(!conn.state().is_connecting);
}

#[tokio::test]
async fn unreachable_server_fails_after_retries() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut conn_config = SyncConfig {
        socket_url: format!("ws://{addr}/socket"),
        ..Default::default()
    };
    conn_config.reconnect.max_attempts = 2;
    conn_config.reconnect.initial_delay = Duration::from_millis(5);
    let conn = ConnectionManager::new(
        conn_config,
        Arc::new(WsConnector::new()),
        Arc::new(StaticSession::default()),
    );
    let err = conn.connect().await.unwrap_err();
    assert!(matches!(err, SyncError::Connection(_)), "{err:?}");
    assert_eq!(conn.state().reconnect_attempts, 2);
}
