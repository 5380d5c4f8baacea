use axum::response::Response;
use http::{HeaderMap, StatusCode};
use serde::Serialize;

use super::response::{error_response, json_response};
use crate::error::RelayError;
use crate::protocol::upstream::{conversation_messages, ConversationMessage, ConversationSummary};
use crate::state::AppState;

const NO_SUBJECT: &str = "No subject ID found";
const CHAT_ID_REQUIRED: &str = "Chat ID required";

#[derive(Debug, Serialize)]
struct ConversationList {
    conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Serialize)]
struct ConversationBody {
    messages: Vec<ConversationMessage>,
}

fn require_subject(state: &AppState, headers: &HeaderMap) -> Result<String, RelayError> {
    let subject_id = state
        .sessions
        .read(headers)
        .subject_id
        .ok_or_else(|| RelayError::InvalidRequest(NO_SUBJECT.to_string()))?;
    if !state.upstream.is_configured() {
        return Err(RelayError::Config("MNX_API_KEY is not configured".to_string()));
    }
    Ok(subject_id)
}

/// `GET /history`: the subject's conversations, newest first as listed
/// upstream. Upstream failures yield an empty list.
pub async fn history_handler(state: &AppState, headers: &HeaderMap) -> Response {
    let subject_id = match require_subject(state, headers) {
        Ok(subject_id) => subject_id,
        Err(err) => return error_response(err),
    };

    let conversations = match state.upstream.history(&subject_id).await {
        Ok(history) => history.into_summaries(),
        Err(err) => {
            tracing::warn!(error = %err, "history lookup failed");
            Vec::new()
        }
    };
    json_response(StatusCode::OK, &ConversationList { conversations })
}

/// `GET /conversations/<chat_id>`: user and assistant messages of one
/// conversation. Upstream failures yield an empty list.
pub async fn conversation_handler(state: &AppState, headers: &HeaderMap, chat_id: &str) -> Response {
    let subject_id = match require_subject(state, headers) {
        Ok(subject_id) => subject_id,
        Err(err) => return error_response(err),
    };
    if chat_id.is_empty() {
        return error_response(RelayError::InvalidRequest(CHAT_ID_REQUIRED.to_string()));
    }

    let messages = match state.upstream.read_conversation(&subject_id, chat_id).await {
        Ok(body) => conversation_messages(&body),
        Err(err) => {
            tracing::warn!(error = %err, chat_id, "conversation read failed");
            Vec::new()
        }
    };
    json_response(StatusCode::OK, &ConversationBody { messages })
}
