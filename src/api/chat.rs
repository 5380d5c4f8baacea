use std::time::Duration;

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use http::HeaderMap;
use serde_json::Value;

use super::response::{error_response, sse_ok_response};
use crate::error::RelayError;
use crate::protocol::upstream::CompletionRequest;
use crate::protocol::Provider;
use crate::state::AppState;
use crate::stream::normalize_sse_stream;

const MISSING_SESSION: &str = "Missing session cookies. Call /bootstrap first.";
const INVALID_JSON: &str = "Invalid JSON body";
const INVALID_MESSAGE: &str = "Missing or invalid message field";

/// `POST /chat`: relay one user message and stream the normalized reply.
pub async fn chat_handler(state: &AppState, headers: &HeaderMap, body: &Bytes) -> Response {
    match relay(state, headers, body).await {
        Ok(response) => response,
        Err(err) => error_response(err),
    }
}

async fn relay(state: &AppState, headers: &HeaderMap, body: &Bytes) -> Result<Response, RelayError> {
    let cookies = state.sessions.read(headers);
    let (Some(subject_id), Some(chat_id)) = (cookies.subject_id, cookies.chat_id) else {
        return Err(RelayError::InvalidRequest(MISSING_SESSION.to_string()));
    };

    let payload: Value = serde_json::from_slice(body)
        .map_err(|_| RelayError::InvalidRequest(INVALID_JSON.to_string()))?;
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .ok_or_else(|| RelayError::InvalidRequest(INVALID_MESSAGE.to_string()))?;

    if !state.upstream.is_configured() {
        return Err(RelayError::Config("MNX_API_KEY is not configured".to_string()));
    }

    let chat = &state.config.chat;
    let request = CompletionRequest::new(&chat.model, message, &subject_id, &chat_id, &chat.memory);
    let upstream = state.upstream.chat_completions(&request).await?;

    let provider = Provider::from_model(&chat.model);
    tracing::debug!(
        model = %chat.model,
        provider = provider.as_str(),
        chat_id = %chat_id,
        "relaying chat stream"
    );
    let idle_timeout = Duration::from_secs(state.config.server.stream_idle_timeout);
    let stream = normalize_sse_stream(upstream.bytes_stream(), Some(provider), idle_timeout);
    Ok(sse_ok_response(Body::from_stream(stream)))
}
