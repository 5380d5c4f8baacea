pub mod validation;

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use self::validation::validate_config;

pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://www.mnexium.com/api/v1";

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_base_path")]
    pub base_path: String,
    /// Seconds to wait for upstream response headers (and for whole
    /// non-streaming lookups).
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Seconds allowed between two reads of a streaming upstream body.
    #[serde(default = "default_stream_idle_timeout")]
    pub stream_idle_timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default)]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default = "default_true")]
    pub trust_forwarded_headers: bool,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_base_path() -> String {
    "/api/mnx".to_string()
}
fn default_timeout() -> u64 {
    60
}
fn default_stream_idle_timeout() -> u64 {
    120
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            base_path: default_base_path(),
            timeout: default_timeout(),
            stream_idle_timeout: default_stream_idle_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
            trust_forwarded_headers: true,
        }
    }
}

/// Memory API endpoint and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub openai_api_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub anthropic_api_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub google_api_key: Option<String>,
}

fn default_upstream_base_url() -> String {
    DEFAULT_UPSTREAM_BASE_URL.to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_base_url(),
            api_key: None,
            openai_api_key: None,
            anthropic_api_key: None,
            google_api_key: None,
        }
    }
}

impl UpstreamConfig {
    /// The memory API key, if one is configured and non-blank.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        non_blank(self.api_key.as_deref())
    }
}

/// Cookie naming and lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_cookie_prefix")]
    pub cookie_prefix: String,
    /// Optional infix for the chat cookie: `<prefix><chat_prefix>_chat`.
    #[serde(default)]
    pub chat_prefix: Option<String>,
    #[serde(default = "default_cookie_max_age_secs")]
    pub cookie_max_age_secs: u64,
}

fn default_cookie_prefix() -> String {
    "mnx".to_string()
}
fn default_cookie_max_age_secs() -> u64 {
    60 * 60 * 24 * 180
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_prefix: default_cookie_prefix(),
            chat_prefix: None,
            cookie_max_age_secs: default_cookie_max_age_secs(),
        }
    }
}

/// Whether the upstream should extract memories from the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "FlagOrName")]
pub enum LearnMode {
    #[default]
    On,
    Off,
    Force,
}

/// Conversation summarization aggressiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "FlagOrName")]
pub enum SummarizeMode {
    Light,
    #[default]
    Balanced,
    Aggressive,
    Off,
}

/// YAML/JSON accepts either a boolean or a keyword for the memory modes.
#[derive(Deserialize)]
#[serde(untagged)]
enum FlagOrName {
    Flag(bool),
    Name(String),
}

impl TryFrom<FlagOrName> for LearnMode {
    type Error = String;

    fn try_from(value: FlagOrName) -> Result<Self, Self::Error> {
        match value {
            FlagOrName::Flag(true) => Ok(LearnMode::On),
            FlagOrName::Flag(false) => Ok(LearnMode::Off),
            FlagOrName::Name(name) => match name.as_str() {
                "force" => Ok(LearnMode::Force),
                "on" | "true" => Ok(LearnMode::On),
                "off" | "false" => Ok(LearnMode::Off),
                other => Err(format!(
                    "unknown learn mode '{other}'; expected true, false or \"force\""
                )),
            },
        }
    }
}

impl TryFrom<FlagOrName> for SummarizeMode {
    type Error = String;

    fn try_from(value: FlagOrName) -> Result<Self, Self::Error> {
        match value {
            FlagOrName::Flag(false) => Ok(SummarizeMode::Off),
            FlagOrName::Flag(true) => Err(
                "summarize must be light, balanced, aggressive, off or false".to_string(),
            ),
            FlagOrName::Name(name) => match name.as_str() {
                "light" => Ok(SummarizeMode::Light),
                "balanced" => Ok(SummarizeMode::Balanced),
                "aggressive" => Ok(SummarizeMode::Aggressive),
                "off" | "false" => Ok(SummarizeMode::Off),
                other => Err(format!(
                    "unknown summarize mode '{other}'; expected light, balanced, aggressive or off"
                )),
            },
        }
    }
}

// The upstream expects `learn: true|false|"force"` and `summarize: "<mode>"|false`.
impl Serialize for LearnMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LearnMode::On => serializer.serialize_bool(true),
            LearnMode::Off => serializer.serialize_bool(false),
            LearnMode::Force => serializer.serialize_str("force"),
        }
    }
}

impl Serialize for SummarizeMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SummarizeMode::Off => serializer.serialize_bool(false),
            mode => serializer.serialize_str(mode.as_str()),
        }
    }
}

impl SummarizeMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SummarizeMode::Light => "light",
            SummarizeMode::Balanced => "balanced",
            SummarizeMode::Aggressive => "aggressive",
            SummarizeMode::Off => "off",
        }
    }
}

impl fmt::Display for SummarizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Memory-control options forwarded with every chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryOptions {
    #[serde(default = "default_true")]
    pub history: bool,
    #[serde(default)]
    pub learn: LearnMode,
    #[serde(default = "default_true")]
    pub recall: bool,
    #[serde(default = "default_true")]
    pub profile: bool,
    #[serde(default)]
    pub summarize: SummarizeMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            history: true,
            learn: LearnMode::On,
            recall: true,
            profile: true,
            summarize: SummarizeMode::Balanced,
            system_prompt: None,
        }
    }
}

/// Chat relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub memory: MemoryOptions,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            memory: MemoryOptions::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Text,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

impl AppConfig {
    /// Overlay secrets and deployment knobs from the environment.
    ///
    /// `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = read("MNX_API_KEY") {
            self.upstream.api_key = Some(key);
        }
        if let Some(key) = read("OPENAI_API_KEY") {
            self.upstream.openai_api_key = Some(key);
        }
        if let Some(key) = read("ANTHROPIC_API_KEY") {
            self.upstream.anthropic_api_key = Some(key);
        }
        if let Some(key) = read("GOOGLE_API_KEY") {
            self.upstream.google_api_key = Some(key);
        }
        if let Some(base_url) = read("MNX_BASE_URL") {
            self.upstream.base_url = base_url;
        }
        if let Some(model) = read("MNX_MODEL") {
            self.chat.model = model;
        }
    }
}

#[inline]
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = if contents.trim().is_empty() {
        AppConfig::default()
    } else {
        serde_yaml::from_str(contents)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from a YAML file, apply environment overrides and
/// validate it. A missing file yields the defaults.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) if !contents.trim().is_empty() => serde_yaml::from_str(&contents)?,
        Ok(_) => AppConfig::default(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(err) => return Err(err.into()),
    };
    config.apply_env_overrides(|name| std::env::var(name).ok());
    validate_config(&config)?;
    Ok(config)
}
