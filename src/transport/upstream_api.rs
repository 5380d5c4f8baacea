use std::time::Duration;

use http::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::config::{ServerConfig, UpstreamConfig};
use crate::error::RelayError;
use crate::protocol::upstream::{CompletionRequest, HistoryResponse};
use crate::util::truncate_body;

use super::HttpTransport;

const MNEXIUM_KEY_HEADER: HeaderName = HeaderName::from_static("x-mnexium-key");
const OPENAI_KEY_HEADER: HeaderName = HeaderName::from_static("x-openai-key");
const ANTHROPIC_KEY_HEADER: HeaderName = HeaderName::from_static("x-anthropic-key");
const GOOGLE_KEY_HEADER: HeaderName = HeaderName::from_static("x-google-key");

/// Upper bound on upstream error bodies echoed to clients and logs.
pub const UPSTREAM_ERROR_DETAILS_MAX: usize = 2000;

/// Row limit requested when reading one conversation.
pub const CONVERSATION_READ_LIMIT: u32 = 200;

/// Client for the memory API: completions, history and conversation reads.
#[derive(Debug, Clone)]
pub struct UpstreamApi {
    transport: HttpTransport,
    base_url: url::Url,
    api_key: Option<String>,
    provider_keys: Vec<(HeaderName, String)>,
}

impl UpstreamApi {
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] for a base URL that cannot carry path
    /// segments, and [`RelayError::Internal`] if the HTTP client cannot be
    /// built.
    pub fn new(server: &ServerConfig, upstream: &UpstreamConfig) -> Result<Self, RelayError> {
        let base_url = url::Url::parse(upstream.base_url.trim())
            .map_err(|err| RelayError::Config(format!("upstream.base_url: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RelayError::Config(
                "upstream.base_url cannot carry a path".to_string(),
            ));
        }

        let provider_keys = [
            (OPENAI_KEY_HEADER, upstream.openai_api_key.as_deref()),
            (ANTHROPIC_KEY_HEADER, upstream.anthropic_api_key.as_deref()),
            (GOOGLE_KEY_HEADER, upstream.google_api_key.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, key)| {
            crate::config::non_blank(key).map(|key| (name, key.to_string()))
        })
        .collect();

        Ok(Self {
            transport: HttpTransport::new(server)?,
            base_url,
            api_key: upstream.api_key().map(str::to_string),
            provider_keys,
        })
    }

    /// Whether a memory API key is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[must_use]
    pub fn base_url(&self) -> &url::Url {
        &self.base_url
    }

    fn require_api_key(&self) -> Result<&str, RelayError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| RelayError::Config("MNX_API_KEY is not configured".to_string()))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<url::Url, RelayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RelayError::Config("upstream.base_url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn header_value(value: &str) -> Result<HeaderValue, RelayError> {
        HeaderValue::from_str(value)
            .map_err(|_| RelayError::Config("credential is not a valid header value".to_string()))
    }

    fn bearer_headers(&self) -> Result<http::HeaderMap, RelayError> {
        let api_key = self.require_api_key()?;
        let mut headers = http::HeaderMap::with_capacity(1);
        headers.insert(AUTHORIZATION, Self::header_value(&format!("Bearer {api_key}"))?);
        Ok(headers)
    }

    /// `POST /chat/completions` with streaming enabled.
    ///
    /// # Errors
    ///
    /// [`RelayError::Config`] without an API key, [`RelayError::Transport`]
    /// when the upstream is unreachable, and [`RelayError::Upstream`] for a
    /// non-success status.
    pub async fn chat_completions(
        &self,
        request: &CompletionRequest<'_>,
    ) -> Result<reqwest::Response, RelayError> {
        let api_key = self.require_api_key()?;
        let mut headers = http::HeaderMap::with_capacity(2 + self.provider_keys.len());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(MNEXIUM_KEY_HEADER, Self::header_value(api_key)?);
        for (name, key) in &self.provider_keys {
            headers.insert(name.clone(), Self::header_value(key)?);
        }

        let body = serde_json::to_vec(request)
            .map_err(|err| RelayError::Internal(format!("encode completion request: {err}")))?;
        let url = self.endpoint(&["chat", "completions"])?;
        let response = self
            .transport
            .send_stream(url, headers, bytes::Bytes::from(body))
            .await
            .inspect_err(|err| tracing::error!(error = %err, "upstream chat request failed"))?;

        ensure_success(response, "chat completions", self.transport.request_timeout()).await
    }

    /// `GET /history/<subject>`.
    ///
    /// # Errors
    ///
    /// Any configuration, transport, status or decoding failure.
    pub async fn history(&self, subject_id: &str) -> Result<HistoryResponse, RelayError> {
        let headers = self.bearer_headers()?;
        let url = self.endpoint(&["history", subject_id])?;
        let response = self.transport.send_get(&url, &headers).await?;
        let response = ensure_success(response, "history", self.transport.request_timeout()).await?;
        let body = read_body(response).await?;
        serde_json::from_slice::<HistoryResponse>(&body)
            .map_err(|err| RelayError::Transport(format!("decode history: {err}")))
    }

    /// `GET /chat/history/read?chat_id&subject_id&limit`. The body is
    /// returned undecoded; its shape varies.
    ///
    /// # Errors
    ///
    /// Any configuration, transport, status or decoding failure.
    pub async fn read_conversation(
        &self,
        subject_id: &str,
        chat_id: &str,
    ) -> Result<Value, RelayError> {
        let headers = self.bearer_headers()?;
        let mut url = self.endpoint(&["chat", "history", "read"])?;
        url.query_pairs_mut()
            .append_pair("chat_id", chat_id)
            .append_pair("subject_id", subject_id)
            .append_pair("limit", &CONVERSATION_READ_LIMIT.to_string());
        let response = self.transport.send_get(&url, &headers).await?;
        let response =
            ensure_success(response, "conversation read", self.transport.request_timeout())
                .await?;
        let body = read_body(response).await?;
        serde_json::from_slice::<Value>(&body)
            .map_err(|err| RelayError::Transport(format!("decode conversation: {err}")))
    }
}

async fn read_body(response: reqwest::Response) -> Result<bytes::Bytes, RelayError> {
    response
        .bytes()
        .await
        .map_err(|err| RelayError::Transport(format!("read upstream body: {err}")))
}

async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
    read_timeout: Duration,
) -> Result<reqwest::Response, RelayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let details = match tokio::time::timeout(read_timeout, response.bytes()).await {
        Ok(Ok(body)) => truncate_body(&body, UPSTREAM_ERROR_DETAILS_MAX),
        Ok(Err(err)) => {
            tracing::warn!(
                operation,
                status = status.as_u16(),
                error = %err,
                "failed to read upstream error body"
            );
            String::new()
        }
        Err(_) => {
            tracing::warn!(
                operation,
                status = status.as_u16(),
                timeout_secs = read_timeout.as_secs(),
                "timed out reading upstream error body"
            );
            String::new()
        }
    };
    tracing::warn!(
        operation,
        status = status.as_u16(),
        details = %details,
        "upstream returned error status"
    );
    Err(RelayError::Upstream {
        status: status.as_u16(),
        details,
    })
}
