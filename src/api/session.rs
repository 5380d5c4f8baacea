use axum::response::Response;
use http::{HeaderMap, StatusCode, Uri};

use super::response::{append_set_cookies, json_response};
use crate::session::SessionOutcome;
use crate::state::AppState;

/// `GET /bootstrap`: resolve (or mint) the subject and chat identities.
pub async fn bootstrap_handler(state: &AppState, uri: &Uri, headers: &HeaderMap) -> Response {
    let outcome = state
        .sessions
        .bootstrap(uri, headers, &state.upstream)
        .await;
    session_response(&outcome)
}

/// `POST /new-chat`: keep the subject, rotate the chat identity.
pub fn new_chat_handler(state: &AppState, uri: &Uri, headers: &HeaderMap) -> Response {
    let outcome = state.sessions.new_chat(uri, headers);
    tracing::debug!(subject_id = %outcome.subject_id, chat_id = %outcome.chat_id, "rotated chat");
    session_response(&outcome)
}

fn session_response(outcome: &SessionOutcome) -> Response {
    let mut response = json_response(StatusCode::OK, outcome);
    append_set_cookies(&mut response, &outcome.set_cookies);
    response
}
