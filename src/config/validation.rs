use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_session(config)?;
    validate_chat(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if server.stream_idle_timeout == 0 {
        return Err(validation_err(
            "server.stream_idle_timeout must be greater than 0",
        ));
    }
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    let base_path = server.base_path.trim();
    if !base_path.is_empty() && base_path.contains(|c: char| c.is_whitespace() || c == '?') {
        return Err(validation_err(format!(
            "server.base_path '{base_path}' must be a plain path"
        )));
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let base_url = config.upstream.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(validation_err(
            "upstream.base_url must start with http:// or https://",
        ));
    }
    if url::Url::parse(base_url).is_err() {
        return Err(validation_err("upstream.base_url is not a valid URL"));
    }
    Ok(())
}

fn is_cookie_name_safe(name: &str) -> bool {
    name.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn validate_session(config: &AppConfig) -> Result<(), ConfigError> {
    let session = &config.session;
    if session.cookie_prefix.is_empty() {
        return Err(validation_err("session.cookie_prefix cannot be empty"));
    }
    if !is_cookie_name_safe(&session.cookie_prefix) {
        return Err(validation_err(format!(
            "session.cookie_prefix '{}' may only contain ASCII letters, digits, '_' and '-'",
            session.cookie_prefix
        )));
    }
    if let Some(chat_prefix) = session.chat_prefix.as_deref() {
        if !is_cookie_name_safe(chat_prefix) {
            return Err(validation_err(format!(
                "session.chat_prefix '{chat_prefix}' may only contain ASCII letters, digits, '_' and '-'"
            )));
        }
    }
    if session.cookie_max_age_secs == 0 {
        return Err(validation_err(
            "session.cookie_max_age_secs must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_chat(config: &AppConfig) -> Result<(), ConfigError> {
    if config.chat.model.trim().is_empty() {
        return Err(validation_err("chat.model cannot be empty"));
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &[
    "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "DISABLED",
];

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "Invalid log_level '{}'. Must be one of: {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}
