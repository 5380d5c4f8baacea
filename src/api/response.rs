//! Response builders shared by the handlers.

use axum::body::Body;
use axum::response::{IntoResponse, Json, Response};
use http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE, SET_COOKIE};
use http::{HeaderValue, StatusCode};
use serde::Serialize;

use crate::error::RelayError;

pub(crate) fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response {
    (status, Json(value)).into_response()
}

/// Append one `Set-Cookie` header per directive.
pub(crate) fn append_set_cookies(response: &mut Response, cookies: &[String]) {
    let headers = response.headers_mut();
    for cookie in cookies {
        match HeaderValue::from_str(cookie) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(err) => tracing::warn!(error = %err, "dropping unencodable Set-Cookie directive"),
        }
    }
}

/// `200 text/event-stream` around an already-normalized body.
pub(crate) fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

/// Log a handler error at a level matching its category, then render it.
pub(crate) fn error_response(err: RelayError) -> Response {
    use crate::error::ErrorCategory;
    match err.category() {
        ErrorCategory::Client => tracing::debug!(error = %err, "rejected request"),
        ErrorCategory::Upstream => tracing::warn!(error = %err, "upstream failure"),
        ErrorCategory::Configuration | ErrorCategory::Internal => {
            tracing::error!(error = %err, "request failed");
        }
    }
    err.into_response()
}
