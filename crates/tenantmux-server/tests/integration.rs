#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! End-to-end tests for the HTTP surface, driven through the router with
//! `tower::ServiceExt::oneshot`.

use std::time::Duration;

use axum::body::{Body, BodyDataStream};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tokio_stream::StreamExt;
use tower::ServiceExt;

use tenantmux_core::{SessionRegistry, TenantDirectory, TenantRecord};
use tenantmux_server::{AppState, build_router};

fn app() -> axum::Router {
    build_router(AppState::new(
        TenantDirectory::with_tenants([
            TenantRecord::new("acme", "Acme Co", "postgres://acme@localhost/acme"),
            TenantRecord::new("globex", "Globex", "postgres://globex@localhost/globex"),
        ]),
        SessionRegistry::with_defaults(),
    ))
}

/// Send a request and return (status, body text).
async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, String) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let body = body.map_or_else(Body::empty, |v| Body::from(v.to_string()));
    let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

async fn send_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, text) = send(app, method, uri, body).await;
    (status, serde_json::from_str(&text).unwrap_or(Value::Null))
}

/// Open the tenant's SSE stream and return its body.
async fn open_stream(app: &axum::Router, tenant: &str) -> BodyDataStream {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/{tenant}/mcp"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"), "{content_type}");
    resp.into_body().into_data_stream()
}

/// Read from the stream until the accumulated text contains `needle`.
async fn read_until(body: &mut BodyDataStream, needle: &str) -> String {
    let mut text = String::new();
    while !text.contains(needle) {
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {needle:?}, got {text:?}"))
            .unwrap_or_else(|| panic!("stream ended before {needle:?}, got {text:?}"))
            .unwrap();
        text.push_str(&String::from_utf8_lossy(&chunk));
    }
    text
}

/// Read the endpoint event and return the session id it announces.
async fn read_session_id(body: &mut BodyDataStream) -> String {
    let text = read_until(body, "\n\n").await;
    assert!(text.contains("event: endpoint"), "{text}");
    let start = text.find("sessionId=").unwrap() + "sessionId=".len();
    text[start..].lines().next().unwrap().trim().to_string()
}

async fn wait_for_open_streams(app: &axum::Router, expected: u64) {
    for _ in 0..100 {
        let (_, health) = send_json(app, "GET", "/health", None).await;
        if health["openStreams"] == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("open stream count never reached {expected}");
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = send_json(&app(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["openStreams"], 0);
    assert!(body["timestamp"].is_i64());
}

#[tokio::test]
async fn tenants_are_listed_without_connection_info() {
    let (status, body) = send_json(&app(), "GET", "/tenants", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["tenants"],
        json!([{ "id": "acme", "name": "Acme Co" }, { "id": "globex", "name": "Globex" }])
    );
}

#[tokio::test]
async fn unknown_tenant_lists_available_ones() {
    let (status, body) = send_json(&app(), "GET", "/initech", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Tenant not found: initech");
    assert_eq!(body["availableTenants"], json!(["acme", "globex"]));
}

#[tokio::test]
async fn tenant_info_points_at_stream_endpoint() {
    let (status, body) = send_json(&app(), "GET", "/acme", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant"]["name"], "Acme Co");
    assert_eq!(body["mcpEndpoint"], "/acme/mcp");
    assert_eq!(body["streamOpen"], false);
}

#[tokio::test]
async fn stream_for_unknown_tenant_is_404() {
    let (status, body) = send_json(&app(), "GET", "/initech/mcp", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Tenant not found: initech");
}

#[tokio::test]
async fn command_without_open_stream_is_409() {
    let ping = json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" });
    let (status, body) = send_json(&app(), "POST", "/acme/mcp", Some(ping)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Stream not open for tenant acme");
}

#[tokio::test]
async fn malformed_command_is_400() {
    let app = app();
    let _stream = open_stream(&app, "acme").await;
    let (status, _) = send(&app, "POST", "/acme/mcp", Some(json!("not a message"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reply_travels_over_the_open_stream() {
    let app = app();
    let mut stream = open_stream(&app, "acme").await;
    let session_id = read_session_id(&mut stream).await;

    let ping = json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" });
    let (status, text) = send(
        &app,
        "POST",
        &format!("/acme/mcp?sessionId={session_id}"),
        Some(ping),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(text, "Accepted");

    let text = read_until(&mut stream, "\"id\":1").await;
    assert!(text.contains("event: message"), "{text}");
    assert!(text.contains(r#"data: {"jsonrpc":"2.0","id":1,"result":{}}"#), "{text}");
}

#[tokio::test]
async fn tool_call_over_the_stream_names_the_tenant() {
    let app = app();
    let mut stream = open_stream(&app, "globex").await;
    read_session_id(&mut stream).await;

    let call = json!({
        "jsonrpc": "2.0",
        "id": "c1",
        "method": "tools/call",
        "params": { "name": "tenant_echo", "arguments": {} },
    });
    let (status, _) = send(&app, "POST", "/globex/mcp", Some(call)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let text = read_until(&mut stream, "Request from Globex").await;
    assert!(text.contains("\"id\":\"c1\""), "{text}");
}

#[tokio::test]
async fn reconnect_replaces_the_prior_stream() {
    let app = app();
    let mut first = open_stream(&app, "acme").await;
    let first_id = read_session_id(&mut first).await;

    let mut second = open_stream(&app, "acme").await;
    let second_id = read_session_id(&mut second).await;
    assert_ne!(first_id, second_id);

    let text = read_until(&mut first, "event: close").await;
    let text = if text.contains("replaced") {
        text
    } else {
        read_until(&mut first, "replaced").await
    };
    assert!(text.contains("replaced by a newer connection"), "{text}");

    // A command tagged with the stale session is refused.
    let ping = json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" });
    let (status, body) = send_json(
        &app,
        "POST",
        &format!("/acme/mcp?sessionId={first_id}"),
        Some(ping.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("replaced"));

    // The new stream still works.
    let (status, _) = send(
        &app,
        "POST",
        &format!("/acme/mcp?sessionId={second_id}"),
        Some(ping),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    read_until(&mut second, "\"id\":1").await;
    wait_for_open_streams(&app, 1).await;
}

#[tokio::test]
async fn disconnect_frees_the_tenant_slot() {
    let app = app();
    let mut stream = open_stream(&app, "acme").await;
    read_session_id(&mut stream).await;
    wait_for_open_streams(&app, 1).await;

    drop(stream);
    wait_for_open_streams(&app, 0).await;

    let ping = json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" });
    let (status, _) = send(&app, "POST", "/acme/mcp", Some(ping)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn explicit_close_ends_the_stream() {
    let app = app();
    let mut stream = open_stream(&app, "acme").await;
    read_session_id(&mut stream).await;

    let (status, _) = send(&app, "DELETE", "/acme/mcp", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let text = read_until(&mut stream, "event: close").await;
    let text = if text.contains("explicit") {
        text
    } else {
        read_until(&mut stream, "explicit").await
    };
    assert!(text.contains("data: explicit"), "{text}");

    // Closing again is harmless.
    let (status, _) = send(&app, "DELETE", "/acme/mcp", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn streams_of_different_tenants_are_isolated() {
    let app = app();
    let mut acme = open_stream(&app, "acme").await;
    read_session_id(&mut acme).await;
    let mut globex = open_stream(&app, "globex").await;
    read_session_id(&mut globex).await;
    wait_for_open_streams(&app, 2).await;

    let ping = json!({ "jsonrpc": "2.0", "id": "g", "method": "ping" });
    let (status, _) = send(&app, "POST", "/globex/mcp", Some(ping)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    read_until(&mut globex, "\"id\":\"g\"").await;

    let ping = json!({ "jsonrpc": "2.0", "id": "a", "method": "ping" });
    let (status, _) = send(&app, "POST", "/acme/mcp", Some(ping)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let text = read_until(&mut acme, "\"id\":\"a\"").await;
    assert!(!text.contains("\"id\":\"g\""), "{text}");
}

#[tokio::test]
async fn execute_runs_tenant_echo() {
    let (status, body) = send_json(
        &app(),
        "POST",
        "/acme/execute",
        Some(json!({ "tool": "tenant_echo" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant"], "acme");
    assert_eq!(body["tool"], "tenant_echo");
    assert_eq!(body["result"], "Request from Acme Co");
}

#[tokio::test]
async fn execute_rejects_unknown_tools() {
    let (status, body) = send_json(
        &app(),
        "POST",
        "/acme/execute",
        Some(json!({ "tool": "http_request" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["supportedTools"], json!(["tenant_echo"]));
}

#[tokio::test]
async fn tenants_can_be_added_and_removed_at_runtime() {
    let app = app();
    let record = json!({ "id": "initech", "name": "Initech", "connectionInfo": "opaque" });
    let (status, body) = send_json(&app, "POST", "/tenants", Some(record)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["connectionInfo"], "opaque");

    let (status, _) = send(&app, "GET", "/initech", None).await;
    assert_eq!(status, StatusCode::OK);

    let mut stream = open_stream(&app, "initech").await;
    read_session_id(&mut stream).await;

    let (status, _) = send(&app, "DELETE", "/tenants/initech", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    read_until(&mut stream, "event: close").await;

    let (status, _) = send(&app, "GET", "/initech", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "DELETE", "/tenants/initech", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_tenant_id_is_rejected() {
    let record = json!({ "id": "", "name": "Nobody" });
    let (status, _) = send(&app(), "POST", "/tenants", Some(record)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
