//! `HttpApiClient` against a small axum REST server.
//!
//! Tests cover:
//! - Resource paths and methods for each store's calls
//! - Bearer token forwarding
//! - Status mapping (404 as absent, other failures keep their status)

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use dealroom_sdk::api::{ApiClient, HttpApiClient};
use dealroom_sdk::models::ReportPatch;
use dealroom_sdk::StaticSession;
use parking_lot::Mutex;
use serde_json::{Value, json};

/// Requests the server saw, as `METHOD path auth`.
type Seen = Arc<Mutex<Vec<String>>>;

fn record(seen: &Seen, method: &str, path: String, headers: &HeaderMap) {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    seen.lock().push(format!("{method} {path} {auth}"));
}

async fn get_report(
    State(seen): State<Seen>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    record(&seen, "GET", format!("/api/transactions/{id}/report"), &headers);
    if id == "missing" {
        return (StatusCode::NOT_FOUND, "no report").into_response();
    }
    Json(json!({"id": "r1", "transactionId": id, "data": {"price": 510000}})).into_response()
}

async fn patch_report(
    State(seen): State<Seen>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<Value>,
) -> Json<Value> {
    record(&seen, "PATCH", format!("/api/transactions/{id}/report"), &headers);
    Json(json!({"id": "r1", "transactionId": id, "data": patch["data"].clone()}))
}

async fn get_transaction(
    State(seen): State<Seen>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    record(&seen, "GET", format!("/api/transactions/{id}"), &headers);
    (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable")
}

async fn list_notifications(State(seen): State<Seen>, headers: HeaderMap) -> Json<Value> {
    record(&seen, "GET", "/api/notifications".into(), &headers);
    Json(json!([
        {"id": "n1", "title": "Inspection tomorrow", "createdAt": "2026-05-01T09:00:00Z"}
    ]))
}

async fn mark_read(
    State(seen): State<Seen>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Json<Value> {
    record(&seen, "POST", format!("/api/notifications/{id}/read"), &headers);
    Json(json!({
        "id": id,
        "title": "Inspection tomorrow",
        "read": true,
        "createdAt": "2026-05-01T09:00:00Z"
    }))
}

async fn mark_all_read(State(seen): State<Seen>, headers: HeaderMap) -> StatusCode {
    record(&seen, "POST", "/api/notifications/read-all".into(), &headers);
    StatusCode::NO_CONTENT
}

async fn start_server() -> (String, Seen) {
    let seen: Seen = Arc::default();
    let app = Router::new()
        .route("/api/transactions/{id}/report", get(get_report).patch(patch_report))
        .route("/api/transactions/{id}", get(get_transaction))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/{id}/read", post(mark_read))
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/api"), seen)
}

fn client(base: &str, token: Option<&str>) -> HttpApiClient {
    HttpApiClient::new(base, Arc::new(StaticSession::new(token.map(str::to_string)))).unwrap()
}

#[tokio::test]
async fn report_fetch_and_patch() {
    let (base, seen) = start_server().await;
    let api = client(&base, Some("jwt-api"));

    let report = api.get_transaction_report("txn-1").await.unwrap();
    assert_eq!(report.transaction_id, "txn-1");
    assert_eq!(report.data["price"], 510000);

    let mut data = serde_json::Map::new();
    data.insert("price".into(), json!(525000));
    let patch = ReportPatch {
        data: Some(data),
        ..Default::default()
    };
    let updated = api.update_transaction_report("txn-1", &patch).await.unwrap();
    assert_eq!(updated.data["price"], 525000);

    assert_eq!(
        *seen.lock(),
        vec![
            "GET /api/transactions/txn-1/report Bearer jwt-api".to_string(),
            "PATCH /api/transactions/txn-1/report Bearer jwt-api".to_string(),
        ]
    );
}

#[tokio::test]
async fn missing_resource_is_not_found() {
    let (base, _seen) = start_server().await;
    let api = client(&base, None);
    let err = api.get_transaction_report("missing").await.unwrap_err();
    assert!(err.is_not_found(), "{err}");
}

#[tokio::test]
async fn server_failure_keeps_status_and_body() {
    let (base, _seen) = start_server().await;
    let api = client(&base, None);
    let err = api.get_transaction("txn-1").await.unwrap_err();
    assert!(!err.is_not_found());
    assert_eq!(err.status, Some(500));
    assert!(err.to_string().contains("database unavailable"), "{err}");
}

#[tokio::test]
async fn notification_calls() {
    let (base, seen) = start_server().await;
    let api = client(&base, None);

    let list = api.list_notifications().await.unwrap();
    assert_eq!(list.len(), 1);
    assert!(!list[0].read);

    let n1 = api.mark_notification_read("n1").await.unwrap();
    assert!(n1.read);
    // Empty 204 answer.
    api.mark_all_notifications_read().await.unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            "GET /api/notifications -".to_string(),
            "POST /api/notifications/n1/read -".to_string(),
            "POST /api/notifications/read-all -".to_string(),
        ]
    );
}
