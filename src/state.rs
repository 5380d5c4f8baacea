use crate::config::AppConfig;
use crate::error::RelayError;
use crate::session::SessionManager;
use crate::transport::UpstreamApi;

/// Shared application state accessible to all handlers.
#[derive(Debug)]
pub struct AppState {
    pub config: AppConfig,
    pub upstream: UpstreamApi,
    pub sessions: SessionManager,
}

impl AppState {
    /// Build the state from a loaded config.
    ///
    /// # Errors
    ///
    /// Returns an error when the upstream client cannot be constructed.
    pub fn new(config: AppConfig) -> Result<Self, RelayError> {
        let upstream = UpstreamApi::new(&config.server, &config.upstream)?;
        let sessions =
            SessionManager::new(&config.session, config.server.trust_forwarded_headers);
        Ok(Self {
            config,
            upstream,
            sessions,
        })
    }
}
