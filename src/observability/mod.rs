use std::time::Instant;

use tracing_subscriber::EnvFilter;

use crate::config::{FeaturesConfig, LogFormat};

/// Map a configured log level onto a tracing filter directive.
///
/// - "DISABLED" -> `None`, no subscriber is installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, WARN, ERROR)
#[must_use]
pub fn tracing_directive(log_level: &str) -> Option<String> {
    let level = log_level.trim().to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

/// Initialize the tracing subscriber from the `features` config section.
pub fn init_tracing(features: &FeaturesConfig) {
    let Some(directive) = tracing_directive(&features.log_level) else {
        return;
    };
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("INFO"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);
    match features.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Log one handled request with its status and latency.
pub fn log_request_complete(method: &http::Method, path: &str, status: u16, start: Instant) {
    let elapsed_ms = start.elapsed().as_millis();
    if status >= 500 {
        tracing::warn!(%method, path, status, elapsed_ms, "request failed");
    } else {
        tracing::info!(%method, path, status, elapsed_ms, "request complete");
    }
}
