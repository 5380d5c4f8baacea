//! Subject and chat identity cookies.
//!
//! The subject cookie identifies one visitor across conversations; the chat
//! cookie identifies the active conversation. Both are opaque UUIDs.

pub mod cookie;

use std::future::Future;

use http::{HeaderMap, Uri};
use serde::Serialize;

use crate::config::SessionConfig;
use crate::error::RelayError;
use crate::transport::UpstreamApi;

pub use cookie::{build_set_cookie, cookie_value, is_secure_request, parse_cookie_pairs};

/// Mint a fresh random (version 4) identifier.
#[must_use]
pub fn new_identifier() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Source of a subject's most recent conversation.
pub trait LatestChat {
    /// `Ok(None)` when the subject has no conversations or no lookup is
    /// possible.
    fn latest_chat_id(
        &self,
        subject_id: &str,
    ) -> impl Future<Output = Result<Option<String>, RelayError>> + Send;
}

impl LatestChat for UpstreamApi {
    async fn latest_chat_id(&self, subject_id: &str) -> Result<Option<String>, RelayError> {
        if !self.is_configured() {
            return Ok(None);
        }
        let history = self.history(subject_id).await?;
        Ok(history.latest_chat_id().map(str::to_owned))
    }
}

/// Identifiers read from the request cookies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCookies {
    pub subject_id: Option<String>,
    pub chat_id: Option<String>,
}

/// Resolved identity plus the `Set-Cookie` directives for newly minted ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionOutcome {
    pub subject_id: String,
    pub chat_id: String,
    #[serde(skip)]
    pub set_cookies: Vec<String>,
}

/// Reads and issues the session cookies for one configured prefix.
#[derive(Debug, Clone)]
pub struct SessionManager {
    subject_cookie: String,
    chat_cookie: String,
    max_age_secs: u64,
    trust_forwarded: bool,
}

impl SessionManager {
    #[must_use]
    pub fn new(config: &SessionConfig, trust_forwarded: bool) -> Self {
        let prefix = config.cookie_prefix.as_str();
        let chat_cookie = match config.chat_prefix.as_deref().filter(|p| !p.is_empty()) {
            Some(chat_prefix) => format!("{prefix}{chat_prefix}_chat"),
            None => format!("{prefix}_chat"),
        };
        Self {
            subject_cookie: format!("{prefix}_subject"),
            chat_cookie,
            max_age_secs: config.cookie_max_age_secs,
            trust_forwarded,
        }
    }

    #[must_use]
    pub fn subject_cookie_name(&self) -> &str {
        &self.subject_cookie
    }

    #[must_use]
    pub fn chat_cookie_name(&self) -> &str {
        &self.chat_cookie
    }

    #[must_use]
    pub fn read(&self, headers: &HeaderMap) -> SessionCookies {
        SessionCookies {
            subject_id: cookie_value(headers, &self.subject_cookie),
            chat_id: cookie_value(headers, &self.chat_cookie),
        }
    }

    fn set_cookie(&self, name: &str, value: &str, secure: bool) -> String {
        build_set_cookie(name, value, self.max_age_secs, secure)
    }

    fn resolve_subject(
        &self,
        cookies: &mut SessionCookies,
        secure: bool,
        set_cookies: &mut Vec<String>,
    ) -> String {
        if let Some(subject_id) = cookies.subject_id.take() {
            return subject_id;
        }
        let subject_id = new_identifier();
        set_cookies.push(self.set_cookie(&self.subject_cookie, &subject_id, secure));
        subject_id
    }

    /// Resolve both identities, minting what is missing.
    ///
    /// A missing chat id is first recovered from `history`; lookup failures
    /// are logged and a fresh id is minted instead. Cookies are only issued
    /// for ids that were not already present.
    pub async fn bootstrap<H: LatestChat>(
        &self,
        uri: &Uri,
        headers: &HeaderMap,
        history: &H,
    ) -> SessionOutcome {
        let secure = is_secure_request(uri, headers, self.trust_forwarded);
        let mut cookies = self.read(headers);
        let mut set_cookies = Vec::with_capacity(2);
        let subject_id = self.resolve_subject(&mut cookies, secure, &mut set_cookies);

        let chat_id = match cookies.chat_id.take() {
            Some(chat_id) => chat_id,
            None => {
                let chat_id = match history.latest_chat_id(&subject_id).await {
                    Ok(Some(chat_id)) => {
                        tracing::debug!(subject_id = %subject_id, chat_id = %chat_id, "recovered latest chat");
                        chat_id
                    }
                    Ok(None) => new_identifier(),
                    Err(err) => {
                        tracing::warn!(error = %err, "chat history lookup failed; minting new chat id");
                        new_identifier()
                    }
                };
                set_cookies.push(self.set_cookie(&self.chat_cookie, &chat_id, secure));
                chat_id
            }
        };

        SessionOutcome {
            subject_id,
            chat_id,
            set_cookies,
        }
    }

    /// Keep (or mint) the subject and always rotate the chat id.
    #[must_use]
    pub fn new_chat(&self, uri: &Uri, headers: &HeaderMap) -> SessionOutcome {
        let secure = is_secure_request(uri, headers, self.trust_forwarded);
        let mut cookies = self.read(headers);
        let mut set_cookies = Vec::with_capacity(2);
        let subject_id = self.resolve_subject(&mut cookies, secure, &mut set_cookies);

        let chat_id = new_identifier();
        set_cookies.push(self.set_cookie(&self.chat_cookie, &chat_id, secure));

        SessionOutcome {
            subject_id,
            chat_id,
            set_cookies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::COOKIE;
    use http::HeaderValue;

    struct FixedHistory(Result<Option<String>, ()>);

    impl LatestChat for FixedHistory {
        async fn latest_chat_id(&self, _subject_id: &str) -> Result<Option<String>, RelayError> {
            self.0
                .clone()
                .map_err(|()| RelayError::Transport("connection refused".to_string()))
        }
    }

    fn manager() -> SessionManager {
        SessionManager::new(&SessionConfig::default(), true)
    }

    fn uri() -> Uri {
        Uri::from_static("/api/mnx/bootstrap")
    }

    fn cookie_headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(value).expect("cookie header"));
        headers
    }

    #[test]
    fn test_cookie_names() {
        let manager = manager();
        assert_eq!(manager.subject_cookie_name(), "mnx_subject");
        assert_eq!(manager.chat_cookie_name(), "mnx_chat");

        let config = SessionConfig {
            cookie_prefix: "app".to_string(),
            chat_prefix: Some("_support".to_string()),
            ..SessionConfig::default()
        };
        let manager = SessionManager::new(&config, true);
        assert_eq!(manager.subject_cookie_name(), "app_subject");
        assert_eq!(manager.chat_cookie_name(), "app_support_chat");
    }

    #[test]
    fn test_identifiers_are_v4_uuids() {
        let id = new_identifier();
        let parsed = uuid::Uuid::parse_str(&id).expect("uuid");
        assert_eq!(parsed.get_version_num(), 4);
        assert_ne!(id, new_identifier());
    }

    #[tokio::test]
    async fn test_bootstrap_without_cookies_mints_both() {
        let outcome = manager()
            .bootstrap(&uri(), &HeaderMap::new(), &FixedHistory(Ok(None)))
            .await;
        assert!(!outcome.subject_id.is_empty());
        assert!(!outcome.chat_id.is_empty());
        assert_eq!(outcome.set_cookies.len(), 2);
        assert!(outcome.set_cookies[0].starts_with(&format!("mnx_subject={};", outcome.subject_id)));
        assert!(outcome.set_cookies[1].starts_with(&format!("mnx_chat={};", outcome.chat_id)));
        assert!(outcome.set_cookies.iter().all(|c| !c.contains("Secure")));
    }

    #[tokio::test]
    async fn test_bootstrap_with_cookies_is_stable() {
        let headers = cookie_headers("mnx_subject=s-1; mnx_chat=c-1");
        let outcome = manager()
            .bootstrap(&uri(), &headers, &FixedHistory(Ok(Some("other".into()))))
            .await;
        assert_eq!(outcome.subject_id, "s-1");
        assert_eq!(outcome.chat_id, "c-1");
        assert!(outcome.set_cookies.is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_adopts_latest_chat() {
        let headers = cookie_headers("mnx_subject=s-1");
        let outcome = manager()
            .bootstrap(&uri(), &headers, &FixedHistory(Ok(Some("recent".into()))))
            .await;
        assert_eq!(outcome.subject_id, "s-1");
        assert_eq!(outcome.chat_id, "recent");
        assert_eq!(outcome.set_cookies.len(), 1);
        assert!(outcome.set_cookies[0].starts_with("mnx_chat=recent;"));
    }

    #[tokio::test]
    async fn test_bootstrap_lookup_failure_mints_chat() {
        let mut headers = cookie_headers("mnx_subject=s-1");
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        let outcome = manager()
            .bootstrap(&uri(), &headers, &FixedHistory(Err(())))
            .await;
        assert_eq!(outcome.subject_id, "s-1");
        assert!(uuid::Uuid::parse_str(&outcome.chat_id).is_ok());
        assert_eq!(outcome.set_cookies.len(), 1);
        assert!(outcome.set_cookies[0].ends_with("; Secure"));
    }

    #[test]
    fn test_new_chat_rotates_chat_only() {
        let headers = cookie_headers("mnx_subject=s-1; mnx_chat=c-1");
        let outcome = manager().new_chat(&uri(), &headers);
        assert_eq!(outcome.subject_id, "s-1");
        assert_ne!(outcome.chat_id, "c-1");
        assert_eq!(outcome.set_cookies.len(), 1);
        assert!(outcome.set_cookies[0].starts_with("mnx_chat="));
    }

    #[test]
    fn test_new_chat_without_subject_mints_both() {
        let outcome = manager().new_chat(&uri(), &HeaderMap::new());
        assert_eq!(outcome.set_cookies.len(), 2);
    }

    #[test]
    fn test_outcome_serializes_ids_only() {
        let outcome = SessionOutcome {
            subject_id: "s".to_string(),
            chat_id: "c".to_string(),
            set_cookies: vec!["x=y".to_string()],
        };
        assert_eq!(
            serde_json::to_value(&outcome).expect("json"),
            serde_json::json!({"subject_id": "s", "chat_id": "c"})
        );
    }
}
