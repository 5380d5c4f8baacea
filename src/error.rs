use serde_json::{json, Value};

/// Error type surfaced by the relay handlers.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Missing session cookies, malformed body, missing message.
    #[error("{0}")]
    InvalidRequest(String),
    /// Required upstream credential or setting is missing.
    #[error("Config error: {0}")]
    Config(String),
    /// Upstream answered with a non-success status.
    #[error("Upstream error: status={status}, details={details}")]
    Upstream { status: u16, details: String },
    /// The upstream could not be reached or the exchange broke off.
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Client,
    Configuration,
    Upstream,
    Internal,
}

impl RelayError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::InvalidRequest(_) => ErrorCategory::Client,
            RelayError::Config(_) => ErrorCategory::Configuration,
            RelayError::Upstream { .. } | RelayError::Transport(_) => ErrorCategory::Upstream,
            RelayError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// HTTP status for the downstream response.
    ///
    /// Upstream statuses are propagated when they are error statuses; anything
    /// else collapses to 502.
    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        match self {
            RelayError::InvalidRequest(_) => http::StatusCode::BAD_REQUEST,
            RelayError::Config(_) | RelayError::Internal(_) => {
                http::StatusCode::INTERNAL_SERVER_ERROR
            }
            RelayError::Upstream { status, .. } => http::StatusCode::from_u16(*status)
                .ok()
                .filter(|code| code.is_client_error() || code.is_server_error())
                .unwrap_or(http::StatusCode::BAD_GATEWAY),
            RelayError::Transport(_) => http::StatusCode::BAD_GATEWAY,
        }
    }
}

/// Format an error as `(status, JSON body)`.
///
/// Configuration and internal errors use a fixed message so credentials and
/// internals never reach the client.
#[must_use]
pub fn format_error(err: &RelayError) -> (http::StatusCode, Value) {
    let body = match err {
        RelayError::InvalidRequest(message) => json!({ "error": message }),
        RelayError::Config(_) => json!({ "error": "Server configuration error" }),
        RelayError::Upstream { details, .. } => json!({
            "error": "Upstream API error",
            "details": details,
        }),
        RelayError::Transport(_) => json!({ "error": "Failed to connect to upstream API" }),
        RelayError::Internal(_) => json!({ "error": "Internal server error" }),
    };
    (err.status(), body)
}

impl axum::response::IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = format_error(&self);
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_surface_message() {
        let err = RelayError::InvalidRequest("Invalid JSON body".to_string());
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid JSON body");
        assert_eq!(err.category(), ErrorCategory::Client);
    }

    #[test]
    fn test_config_error_does_not_leak_details() {
        let err = RelayError::Config("MNX_API_KEY is not set".to_string());
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.to_string().contains("MNX_API_KEY"));
    }

    #[test]
    fn test_upstream_status_is_propagated() {
        let err = RelayError::Upstream {
            status: 429,
            details: "slow down".to_string(),
        };
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["details"], "slow down");
    }

    #[test]
    fn test_upstream_non_error_status_becomes_bad_gateway() {
        for status in [0, 204, 302, 1000] {
            let err = RelayError::Upstream {
                status,
                details: String::new(),
            };
            assert_eq!(err.status(), http::StatusCode::BAD_GATEWAY, "{status}");
        }
        assert_eq!(
            RelayError::Transport("refused".into()).status(),
            http::StatusCode::BAD_GATEWAY
        );
    }
}
