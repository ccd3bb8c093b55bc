//! End-to-end sync tests over the in-memory transport.
//!
//! Tests cover:
//! - Push events reaching the stores through a live connection
//! - Reconnect after a transport drop, with handlers attached exactly once
//! - connect() while a reconnect is running reusing that reconnect
//! - Reconnect exhaustion leaving a persistent error state
//! - Service lifecycle (init/dispose)

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dealroom_sdk::api::{ApiClient, ApiResult};
use dealroom_sdk::event::names;
use dealroom_sdk::models::*;
use dealroom_sdk::transport::{MemoryConnector, MemoryServer, ServerSide};
use dealroom_sdk::{
    ApiError, ConnectionState, ReconnectConfig, StaticSession, SyncConfig, SyncService, handler,
};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::watch;
use tokio::time::timeout;

const TIMEOUT_MS: u64 = 5000;

/// Serves reports from a map; every other resource is absent.
#[derive(Default)]
struct ReportApi {
    reports: Mutex<HashMap<String, TransactionReport>>,
    calls: AtomicUsize,
}

fn absent<T>() -> ApiResult<T> {
    Err(ApiError::not_found("not found"))
}

impl ApiClient for ReportApi {
    fn get_transaction_report<'a>(
        &'a self,
        transaction_id: &'a str,
    ) -> BoxFuture<'a, ApiResult<TransactionReport>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.reports
                .lock()
                .get(transaction_id)
                .cloned()
                .map_or_else(absent, Ok)
        })
    }

    fn update_transaction_report<'a>(
        &'a self,
        _transaction_id: &'a str,
        _patch: &'a ReportPatch,
    ) -> BoxFuture<'a, ApiResult<TransactionReport>> {
        Box::pin(async { absent() })
    }

    fn get_transaction<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, ApiResult<Transaction>> {
        Box::pin(async { absent() })
    }

    fn get_document<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, ApiResult<Document>> {
        Box::pin(async { absent() })
    }

    fn list_notifications(&self) -> BoxFuture<'_, ApiResult<Vec<Notification>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn mark_notification_read<'a>(
        &'a self,
        _id: &'a str,
    ) -> BoxFuture<'a, ApiResult<Notification>> {
        Box::pin(async { absent() })
    }

    fn mark_all_notifications_read(&self) -> BoxFuture<'_, ApiResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn get_user_settings(&self) -> BoxFuture<'_, ApiResult<UserSettings>> {
        Box::pin(async { absent() })
    }

    fn update_profile<'a>(
        &'a self,
        _patch: &'a ProfilePatch,
    ) -> BoxFuture<'a, ApiResult<ProfileSettings>> {
        Box::pin(async { absent() })
    }

    fn update_notification_preferences<'a>(
        &'a self,
        _patch: &'a NotificationPreferencesPatch,
    ) -> BoxFuture<'a, ApiResult<NotificationPreferences>> {
        Box::pin(async { absent() })
    }

    fn update_display_preferences<'a>(
        &'a self,
        _patch: &'a DisplayPreferencesPatch,
    ) -> BoxFuture<'a, ApiResult<DisplayPreferences>> {
        Box::pin(async { absent() })
    }
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        connect_timeout: Duration::from_secs(2),
        reconnect: ReconnectConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            backoff_factor: 2.0,
        },
        ..Default::default()
    }
}

fn build(api: Arc<ReportApi>) -> (Arc<SyncService>, MemoryServer) {
    let (connector, server) = MemoryConnector::pair();
    let service = SyncService::new(
        fast_config(),
        Arc::new(connector),
        Arc::new(StaticSession::new(Some("jwt-1".into()))),
        api,
    );
    (Arc::new(service), server)
}

/// Run `init()` against the memory server and return the server end.
async fn init(service: &Arc<SyncService>, server: &mut MemoryServer) -> ServerSide {
    let initializing = tokio::spawn({
        let service = service.clone();
        async move { service.init().await }
    });
    let mut side = server.accept().await.expect("server gone");
    let token = side.accept_handshake("sock-1").await.unwrap();
    assert_eq!(token.as_deref(), Some("jwt-1"));
    initializing.await.unwrap().unwrap();
    side
}

/// Wait until the connection state satisfies `predicate`.
async fn wait_state(
    rx: &mut watch::Receiver<ConnectionState>,
    predicate: impl Fn(&ConnectionState) -> bool,
    desc: &str,
) {
    let waited = timeout(Duration::from_millis(TIMEOUT_MS), async {
        loop {
            if predicate(&rx.borrow_and_update()) {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    })
    .await;
    assert!(waited.is_ok(), "Timeout waiting for: {desc}");
}

async fn wait_until(check: impl Fn() -> bool, desc: &str) {
    let waited = timeout(Duration::from_millis(TIMEOUT_MS), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "Timeout waiting for: {desc}");
}

// ── Push → store ───────────────────────────────────────────────────────

#[tokio::test]
async fn report_created_lands_in_store_without_moving_current() {
    let api = Arc::new(ReportApi::default());
    api.reports.lock().insert(
        "txn-1".into(),
        TransactionReport {
            id: "r1".into(),
            transaction_id: "txn-1".into(),
            data: Default::default(),
            status: None,
            generated_at: None,
            updated_at: None,
        },
    );
    let (service, mut server) = build(api.clone());
    let side = init(&service, &mut server).await;
    let reports = service.reports();
    reports.fetch_transaction_report("txn-1").await.unwrap();

    side.emit(
        names::REPORT_CREATED,
        json!({"transactionId": "txn-9", "report": {"id": "r9", "data": {"price": "$1"}}}),
    )
    .await
    .unwrap();
    wait_until(|| reports.get("txn-9").is_some(), "report:created applied").await;

    let r9 = reports.get("txn-9").unwrap();
    assert_eq!(r9.id, "r9");
    assert_eq!(r9.data["price"], "$1");
    assert_eq!(reports.current().unwrap().transaction_id, "txn-1");
    assert_eq!(api.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn updates_for_current_report_are_visible_through_current() {
    let (service, mut server) = build(Arc::new(ReportApi::default()));
    let side = init(&service, &mut server).await;
    let reports = service.reports();

    side.emit(
        names::REPORT_CREATED,
        json!({"transactionId": "txn-9", "report": {"id": "r9", "data": {"price": "$1"}}}),
    )
    .await
    .unwrap();
    wait_until(|| reports.get("txn-9").is_some(), "report:created applied").await;
    reports.set_current(Some("txn-9"));

    side.emit(
        names::REPORT_UPDATED,
        json!({"transactionId": "txn-9", "report": {"data": {"price": "$2"}}}),
    )
    .await
    .unwrap();
    wait_until(
        || reports.current().is_some_and(|r| r.data["price"] == "$2"),
        "report:updated applied",
    )
    .await;
}

#[tokio::test]
async fn events_from_many_domains_fan_out() {
    let (service, mut server) = build(Arc::new(ReportApi::default()));
    let side = init(&service, &mut server).await;

    side.emit(names::USER_ONLINE, json!({"userId": "agent-7"}))
        .await
        .unwrap();
    side.emit(
        names::TRANSACTION_CREATED,
        json!({"transaction": {"id": "t1", "address": "9 Oak Ave", "status": "active"}}),
    )
    .await
    .unwrap();
    side.emit(
        names::NOTIFICATION_NEW,
        json!({"id": "n1", "title": "Inspection tomorrow", "createdAt": "2026-05-01T09:00:00Z"}),
    )
    .await
    .unwrap();
    side.emit("calendar:synced", json!({})).await.unwrap();

    wait_until(|| service.notifications().unread_count() == 1, "notification").await;
    assert!(service.presence().is_online("agent-7"));
    assert_eq!(service.transactions().get("t1").unwrap().address, "9 Oak Ave");
    assert!(service.connection().is_connected());
}

// ── Reconnect ──────────────────────────────────────────────────────────

#[tokio::test]
async fn reconnect_attaches_each_handler_once() {
    let (service, mut server) = build(Arc::new(ReportApi::default()));
    let conn = service.connection().clone();
    let hits = Arc::new(AtomicUsize::new(0));
    let disconnects = Arc::new(AtomicUsize::new(0));
    let on_online = {
        let hits = hits.clone();
        handler(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    };
    let on_disconnect = {
        let disconnects = disconnects.clone();
        handler(move |_| {
            disconnects.fetch_add(1, Ordering::SeqCst);
        })
    };
    conn.on(names::USER_ONLINE, &on_online);
    conn.on(names::DISCONNECT, &on_disconnect);

    let side = init(&service, &mut server).await;
    let mut state = conn.watch_state();
    drop(side);

    wait_state(&mut state, |s| !s.is_connected, "connection lost").await;
    let mut side = server.accept().await.expect("no reconnect attempt");
    side.accept_handshake("sock-2").await.unwrap();
    wait_state(
        &mut state,
        |s| s.socket_id.as_deref() == Some("sock-2"),
        "reconnected",
    )
    .await;

    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    // Ours plus the presence store's.
    assert_eq!(conn.registry().handler_count(names::USER_ONLINE), 2);
    assert_eq!(conn.registry().attached_count(names::USER_ONLINE), 2);
    assert_eq!(
        conn.registry().attached_count(names::REPORT_CREATED),
        1,
        "store listeners re-attached"
    );

    side.emit(names::USER_ONLINE, json!({"userId": "agent-1"}))
        .await
        .unwrap();
    wait_until(|| hits.load(Ordering::SeqCst) > 0, "user:online after reconnect").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn connect_during_reconnect_shares_the_session() {
    let (service, mut server) = build(Arc::new(ReportApi::default()));
    let conn = service.connection().clone();
    let hits = Arc::new(AtomicUsize::new(0));
    let on_online = {
        let hits = hits.clone();
        handler(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    };
    conn.on(names::USER_ONLINE, &on_online);

    let side = init(&service, &mut server).await;
    let mut state = conn.watch_state();
    drop(side);
    wait_state(&mut state, |s| !s.is_connected, "connection lost").await;

    // The UI retries while the session task is already reconnecting.
    let retry = tokio::spawn({
        let conn = conn.clone();
        async move { conn.connect().await }
    });
    let mut side = server.accept().await.expect("no reconnect attempt");
    side.accept_handshake("sock-2").await.unwrap();
    timeout(Duration::from_millis(TIMEOUT_MS), retry)
        .await
        .expect("Timeout waiting for: connect() during reconnect")
        .unwrap()
        .unwrap();

    assert!(conn.is_connected());
    assert_eq!(server.open_count(), 2, "one transport for both paths");
    assert!(
        timeout(Duration::from_millis(50), server.accept()).await.is_err(),
        "no second transport opened"
    );

    side.emit(names::USER_ONLINE, json!({"userId": "agent-3"}))
        .await
        .unwrap();
    wait_until(|| hits.load(Ordering::SeqCst) > 0, "user:online after reconnect").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1, "delivered once");

    conn.disconnect();
    assert!(side.recv().await.is_none(), "disconnect closes the live transport");
}

#[tokio::test]
async fn reconnect_gives_up_after_max_attempts() {
    let (service, mut server) = build(Arc::new(ReportApi::default()));
    let side = init(&service, &mut server).await;
    let mut state = service.connection().watch_state();

    server.refuse_next(10, "connection refused");
    drop(side);

    wait_state(
        &mut state,
        |s| !s.is_connected && !s.is_connecting && s.error.is_some(),
        "reconnect exhausted",
    )
    .await;
    let final_state = service.connection_state();
    assert!(final_state.error.unwrap().starts_with("reconnect failed"));
    assert_eq!(final_state.reconnect_attempts, 3);

    let opens = server.open_count();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.open_count(), opens, "no retries after exhaustion");
}

// ── Lifecycle ──────────────────────────────────────────────────────────

#[tokio::test]
async fn dispose_closes_channel_and_empties_stores() {
    let (service, mut server) = build(Arc::new(ReportApi::default()));
    let mut side = init(&service, &mut server).await;
    side.emit(names::USER_ONLINE, json!({"userId": "agent-1"}))
        .await
        .unwrap();
    wait_until(|| service.presence().is_online("agent-1"), "presence").await;

    service.dispose();
    assert!(!service.connection().is_connected());
    assert_eq!(service.connection_state(), ConnectionState::default());
    assert!(service.presence().online_users().is_empty());
    assert!(side.recv().await.is_none(), "server sees the close");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.open_count(), 1, "local disconnect does not reconnect");
}
