use std::time::Duration;

use crate::config::ServerConfig;
use crate::error::RelayError;

use super::retry_policy::{
    retry_backoff_delay, retry_delay, should_retry_transport_error,
    should_retry_upstream_status, RETRY_MAX_ATTEMPTS,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
) -> Result<reqwest::Client, RelayError> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .map_err(|err| RelayError::Internal(format!("Failed to build HTTP client: {err}")))
}

/// Pooled HTTP client for the upstream API.
///
/// Streaming requests bound only the wait for response headers; the body is
/// read under the stream idle timeout. Buffered requests are bounded as a
/// whole and retried on transient failures.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns [`RelayError::Internal`] when the TLS backend cannot be
    /// initialized.
    pub fn new(config: &ServerConfig) -> Result<Self, RelayError> {
        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };
        let client =
            build_reqwest_client(config.http_pool_max_idle_per_host.max(1), pool_idle_timeout)?;
        Ok(Self {
            client,
            request_timeout: Duration::from_secs(config.timeout),
        })
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Send a request whose body will be streamed back. Not retried.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] when the request fails or response
    /// headers do not arrive within the request timeout.
    pub async fn send_stream(
        &self,
        url: url::Url,
        headers: http::HeaderMap,
        body: bytes::Bytes,
    ) -> Result<reqwest::Response, RelayError> {
        let mut request = reqwest::Request::new(http::Method::POST, url);
        *request.headers_mut() = headers;
        *request.body_mut() = Some(reqwest::Body::from(body));

        match tokio::time::timeout(self.request_timeout, self.client.execute(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(RelayError::Transport(err.to_string())),
            Err(_) => Err(RelayError::Transport(format!(
                "no response headers within {}s",
                self.request_timeout.as_secs()
            ))),
        }
    }

    /// Send an idempotent GET, retrying retriable statuses and transient
    /// transport errors up to [`RETRY_MAX_ATTEMPTS`] times.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] when request execution fails or
    /// retries are exhausted.
    pub async fn send_get(
        &self,
        url: &url::Url,
        headers: &http::HeaderMap,
    ) -> Result<reqwest::Response, RelayError> {
        let mut attempt = 0;
        loop {
            let mut request = reqwest::Request::new(http::Method::GET, url.clone());
            *request.headers_mut() = headers.clone();
            *request.timeout_mut() = Some(self.request_timeout);

            match self.client.execute(request).await {
                Ok(response) => {
                    if attempt < RETRY_MAX_ATTEMPTS
                        && should_retry_upstream_status(response.status())
                    {
                        let delay = retry_delay(response.headers(), attempt);
                        tracing::debug!(
                            status = response.status().as_u16(),
                            retry_attempt = attempt + 1,
                            delay_ms = delay.as_millis(),
                            "retrying upstream request after retriable status"
                        );
                        drop(response);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) => {
                    if attempt >= RETRY_MAX_ATTEMPTS || !should_retry_transport_error(&err) {
                        return Err(RelayError::Transport(err.to_string()));
                    }
                    let delay = retry_backoff_delay(attempt);
                    tracing::debug!(
                        retry_attempt = attempt + 1,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "retrying upstream request after transport error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
