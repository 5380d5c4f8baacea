#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::header::SET_COOKIE;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use mnx_relay::config::AppConfig;
use mnx_relay::routing::dispatch::dispatch_request;
use mnx_relay::state::AppState;

pub const BASE_PATH: &str = "/api/mnx";
pub const API_KEY: &str = "mnx-test-key";

/// Serve `app` on an ephemeral local port.
pub async fn spawn_upstream(app: Router) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, server)
}

/// Config pointing at a mock upstream, with the memory API key set.
pub fn config_for(addr: SocketAddr) -> AppConfig {
    let mut config = AppConfig::default();
    config.upstream.base_url = format!("http://{addr}/api/v1");
    config.upstream.api_key = Some(API_KEY.to_string());
    config
}

pub fn build_state(config: AppConfig) -> Arc<AppState> {
    Arc::new(AppState::new(config).expect("app state"))
}

pub async fn send(state: &Arc<AppState>, request: Request<Body>) -> Response {
    dispatch_request(Arc::clone(state), Arc::<str>::from(BASE_PATH), request)
        .await
        .expect("dispatch")
}

pub fn get(path: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(format!("{BASE_PATH}{path}"));
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).expect("build request")
}

pub fn post(path: &str, cookie: Option<&str>, body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("{BASE_PATH}{path}"))
        .header("content-type", "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(body.into()).expect("build request")
}

pub async fn body_bytes(response: Response) -> bytes::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body")
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}

pub async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await.to_vec()).expect("utf8 body")
}

pub fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|value| value.to_str().expect("ascii cookie").to_string())
        .collect()
}

/// `name=value` part of a `Set-Cookie` directive.
pub fn cookie_pair(set_cookie: &str) -> &str {
    set_cookie.split(';').next().unwrap_or_default()
}

pub fn canonical_delta(text: &str) -> String {
    format!(
        "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}},\"index\":0,\"finish_reason\":null}}]}}\n\n",
        serde_json::to_string(text).expect("encode text")
    )
}
