use std::borrow::Cow;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{self, Body};
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::api::{chat, health, history, session};
use crate::observability::log_request_complete;
use crate::state::AppState;

/// Largest accepted request body.
pub const BODY_LIMIT_BYTES: usize = 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
enum RouteMatch<'a> {
    Health,
    Bootstrap,
    NewChat,
    Chat,
    History,
    Conversation { chat_id: &'a str },
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    base_path: Arc<str>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let route = match_route(&parts.method, parts.uri.path(), base_path.as_ref());

    let response = match route {
        RouteMatch::Health => health::health_handler(&state).into_response(),
        RouteMatch::Bootstrap => {
            session::bootstrap_handler(&state, &parts.uri, &parts.headers).await
        }
        RouteMatch::NewChat => session::new_chat_handler(&state, &parts.uri, &parts.headers),
        RouteMatch::Chat => match read_request_body(body).await {
            Ok(body_bytes) => chat::chat_handler(&state, &parts.headers, &body_bytes).await,
            Err(response) => response,
        },
        RouteMatch::History => history::history_handler(&state, &parts.headers).await,
        RouteMatch::Conversation { chat_id } => {
            let chat_id =
                urlencoding::decode(chat_id).map_or_else(|_| chat_id.to_string(), Cow::into_owned);
            history::conversation_handler(&state, &parts.headers, &chat_id).await
        }
        RouteMatch::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        RouteMatch::NotFound => StatusCode::NOT_FOUND.into_response(),
    };

    log_request_complete(
        &parts.method,
        parts.uri.path(),
        response.status().as_u16(),
        start,
    );
    Ok(response)
}

#[must_use]
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("/{}", trimmed.trim_end_matches('/'))
    }
}

async fn read_request_body(body: Body) -> Result<bytes::Bytes, Response> {
    body::to_bytes(body, BODY_LIMIT_BYTES).await.map_err(|_| {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            axum::Json(json!({ "error": "Request body too large (max 1MiB)" })),
        )
            .into_response()
    })
}

fn only<'a>(method: &Method, allowed: Method, route: RouteMatch<'a>) -> RouteMatch<'a> {
    if *method == allowed {
        route
    } else {
        RouteMatch::MethodNotAllowed
    }
}

fn match_route<'a>(method: &Method, path: &'a str, base_path: &str) -> RouteMatch<'a> {
    let Some(path) = strip_base_path(path, base_path) else {
        return RouteMatch::NotFound;
    };

    match path {
        "/" | "/health" => only(method, Method::GET, RouteMatch::Health),
        "/bootstrap" => only(method, Method::GET, RouteMatch::Bootstrap),
        "/new-chat" => only(method, Method::POST, RouteMatch::NewChat),
        "/chat" => only(method, Method::POST, RouteMatch::Chat),
        "/history" => only(method, Method::GET, RouteMatch::History),
        "/conversations" => only(method, Method::GET, RouteMatch::Conversation { chat_id: "" }),
        _ => {
            let Some(chat_id) = path.strip_prefix("/conversations/") else {
                return RouteMatch::NotFound;
            };
            if chat_id.contains('/') {
                RouteMatch::NotFound
            } else {
                only(method, Method::GET, RouteMatch::Conversation { chat_id })
            }
        }
    }
}

fn strip_base_path<'a>(path: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return Some(path);
    }

    let remainder = path.strip_prefix(base_path)?;
    if remainder.is_empty() {
        Some("/")
    } else if remainder.starts_with('/') {
        Some(remainder)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "/api/mnx";

    #[test]
    fn test_normalize_base_path() {
        assert_eq!(normalize_base_path(""), "");
        assert_eq!(normalize_base_path("/"), "");
        assert_eq!(normalize_base_path("api/mnx/"), "/api/mnx");
        assert_eq!(normalize_base_path(" /api/mnx "), "/api/mnx");
    }

    #[test]
    fn test_routes_under_base_path() {
        assert_eq!(match_route(&Method::GET, "/api/mnx/bootstrap", BASE), RouteMatch::Bootstrap);
        assert_eq!(match_route(&Method::POST, "/api/mnx/new-chat", BASE), RouteMatch::NewChat);
        assert_eq!(match_route(&Method::POST, "/api/mnx/chat", BASE), RouteMatch::Chat);
        assert_eq!(match_route(&Method::GET, "/api/mnx/history", BASE), RouteMatch::History);
        assert_eq!(match_route(&Method::GET, "/api/mnx/health", BASE), RouteMatch::Health);
        assert_eq!(match_route(&Method::GET, "/api/mnx", BASE), RouteMatch::Health);
        assert_eq!(
            match_route(&Method::GET, "/api/mnx/conversations/c-1", BASE),
            RouteMatch::Conversation { chat_id: "c-1" }
        );
        assert_eq!(
            match_route(&Method::GET, "/api/mnx/conversations/", BASE),
            RouteMatch::Conversation { chat_id: "" }
        );
    }

    #[test]
    fn test_wrong_method_and_unknown_paths() {
        assert_eq!(match_route(&Method::POST, "/api/mnx/bootstrap", BASE), RouteMatch::MethodNotAllowed);
        assert_eq!(match_route(&Method::GET, "/api/mnx/chat", BASE), RouteMatch::MethodNotAllowed);
        assert_eq!(match_route(&Method::GET, "/api/mnx/unknown", BASE), RouteMatch::NotFound);
        assert_eq!(match_route(&Method::GET, "/bootstrap", BASE), RouteMatch::NotFound);
        assert_eq!(match_route(&Method::GET, "/api/mnxother/bootstrap", BASE), RouteMatch::NotFound);
        assert_eq!(match_route(&Method::GET, "/api/mnx/conversations/a/b", BASE), RouteMatch::NotFound);
    }

    #[test]
    fn test_empty_base_path() {
        assert_eq!(match_route(&Method::GET, "/bootstrap", ""), RouteMatch::Bootstrap);
    }
}
