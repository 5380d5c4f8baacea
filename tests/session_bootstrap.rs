mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get as get_route;
use axum::{Json, Router};
use mnx_relay::config::AppConfig;
use serde_json::json;
use support::*;

#[derive(Clone, Default)]
struct HistoryMock {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

async fn history_route(
    State(mock): State<HistoryMock>,
    Path(subject): Path<String>,
    headers: HeaderMap,
) -> axum::response::Response {
    mock.calls.fetch_add(1, Ordering::SeqCst);
    assert_eq!(
        headers.get("authorization").and_then(|v| v.to_str().ok()),
        Some(format!("Bearer {API_KEY}").as_str())
    );
    if mock.fail {
        return (StatusCode::INTERNAL_SERVER_ERROR, "history unavailable").into_response();
    }
    Json(json!({
        "chats": [
            {"chat_id": format!("recent-{subject}"), "title": "Latest"},
            {"chat_id": "older"}
        ]
    }))
    .into_response()
}

async fn spawn_history(mock: HistoryMock) -> (AppConfig, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/api/v1/history/{subject}", get_route(history_route))
        .with_state(mock);
    let (addr, server) = spawn_upstream(app).await;
    (config_for(addr), server)
}

#[tokio::test]
async fn test_bootstrap_without_cookies_issues_both() {
    let mock = HistoryMock::default();
    let (mut config, server) = spawn_history(mock.clone()).await;
    config.upstream.api_key = None;
    let state = build_state(config);

    let response = send(&state, get("/bootstrap", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    assert!(cookies[0].starts_with("mnx_subject="));
    assert!(cookies[1].starts_with("mnx_chat="));
    for cookie in &cookies {
        assert!(cookie.contains("Max-Age=15552000"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(!cookie.contains("Secure"));
    }

    let body = body_json(response).await;
    let subject_id = body["subject_id"].as_str().expect("subject id");
    let chat_id = body["chat_id"].as_str().expect("chat id");
    assert!(!subject_id.is_empty());
    assert!(!chat_id.is_empty());
    assert_eq!(cookie_pair(&cookies[0]), format!("mnx_subject={subject_id}"));
    // Without a credential no history lookup happens.
    assert_eq!(mock.calls.load(Ordering::SeqCst), 0);

    server.abort();
}

#[tokio::test]
async fn test_bootstrap_is_stable_with_cookies() {
    let (config, server) = spawn_history(HistoryMock::default()).await;
    let state = build_state(config);

    let first = send(&state, get("/bootstrap", None)).await;
    let cookies = set_cookies(&first);
    let first_body = body_json(first).await;
    let cookie_header = cookies
        .iter()
        .map(|cookie| cookie_pair(cookie))
        .collect::<Vec<_>>()
        .join("; ");

    let second = send(&state, get("/bootstrap", Some(&cookie_header))).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert!(set_cookies(&second).is_empty());
    let second_body = body_json(second).await;
    assert_eq!(second_body, first_body);

    server.abort();
}

#[tokio::test]
async fn test_bootstrap_adopts_latest_upstream_chat() {
    let mock = HistoryMock::default();
    let (config, server) = spawn_history(mock.clone()).await;
    let state = build_state(config);

    let response = send(&state, get("/bootstrap", Some("mnx_subject=visitor-1"))).await;
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("mnx_chat=recent-visitor-1;"));

    let body = body_json(response).await;
    assert_eq!(body, json!({"subject_id": "visitor-1", "chat_id": "recent-visitor-1"}));
    assert_eq!(mock.calls.load(Ordering::SeqCst), 1);

    server.abort();
}

#[tokio::test]
async fn test_bootstrap_history_failure_mints_chat() {
    let mock = HistoryMock {
        fail: true,
        ..HistoryMock::default()
    };
    let (config, server) = spawn_history(mock.clone()).await;
    let state = build_state(config);

    let request = axum::http::Request::builder()
        .uri("/api/mnx/bootstrap")
        .header("cookie", "mnx_subject=visitor-2")
        .header("x-forwarded-proto", "https")
        .body(axum::body::Body::empty())
        .expect("request");
    let response = send(&state, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].ends_with("; Secure"));

    let body = body_json(response).await;
    assert_eq!(body["subject_id"], "visitor-2");
    let chat_id = body["chat_id"].as_str().expect("chat id");
    assert!(uuid::Uuid::parse_str(chat_id).is_ok());
    assert_eq!(mock.calls.load(Ordering::SeqCst), 1);

    server.abort();
}

#[tokio::test]
async fn test_new_chat_rotates_only_chat() {
    let (config, server) = spawn_history(HistoryMock::default()).await;
    let state = build_state(config);

    let response = send(
        &state,
        post("/new-chat", Some("mnx_subject=visitor-3; mnx_chat=old-chat"), ""),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("mnx_chat="));

    let body = body_json(response).await;
    assert_eq!(body["subject_id"], "visitor-3");
    assert_ne!(body["chat_id"], "old-chat");
    assert_eq!(cookie_pair(&cookies[0]), format!("mnx_chat={}", body["chat_id"].as_str().expect("chat")));

    server.abort();
}

#[tokio::test]
async fn test_custom_prefixes_name_cookies() {
    let (mut config, server) = spawn_history(HistoryMock::default()).await;
    config.session.cookie_prefix = "acme".to_string();
    config.session.chat_prefix = Some("_help".to_string());
    let state = build_state(config);

    let response = send(&state, get("/bootstrap", Some("mnx_subject=ignored"))).await;
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    assert!(cookies[0].starts_with("acme_subject="));
    assert!(cookies[1].starts_with("acme_help_chat="));

    server.abort();
}

#[tokio::test]
async fn test_health_and_routing_errors() {
    let state = build_state(AppConfig::default());

    let response = send(&state, get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["upstream_configured"], false);

    let response = send(&state, post("/bootstrap", None, "")).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let response = send(&state, get("/nope", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
