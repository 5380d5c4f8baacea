use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and a config summary without secrets.
pub fn health_handler(state: &AppState) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "ok",
        "model": config.chat.model,
        "cookie_prefix": config.session.cookie_prefix,
        "upstream_configured": state.upstream.is_configured(),
    }))
}
