pub mod anthropic;
pub mod gemini;
pub mod openai_chat;
pub mod upstream;

use std::fmt;

use serde_json::Value;

pub use anthropic::is_anthropic_shaped;
pub use gemini::is_google_shaped;
pub use openai_chat::is_openai_shaped;

/// Terminal sentinel carried by the final `data:` line of a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Upstream wire shape a streamed payload follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
}

impl Provider {
    /// Resolve the provider from a model name.
    ///
    /// Matching is a case-insensitive substring test: `claude` selects
    /// Anthropic, `gemini` selects Google, and everything else is treated as
    /// OpenAI-shaped.
    #[must_use]
    pub fn from_model(model: &str) -> Self {
        let lower = model.to_ascii_lowercase();
        if lower.contains("claude") {
            Provider::Anthropic
        } else if lower.contains("gemini") {
            Provider::Google
        } else {
            Provider::OpenAi
        }
    }

    /// Infer the provider from an already-decoded payload.
    ///
    /// Detection order is OpenAI, then Anthropic, then Google; the first match
    /// wins.
    #[must_use]
    pub fn detect_value(value: &Value) -> Option<Self> {
        if openai_chat::is_openai_value(value) {
            Some(Provider::OpenAi)
        } else if anthropic::is_anthropic_value(value) {
            Some(Provider::Anthropic)
        } else if gemini::is_google_value(value) {
            Some(Provider::Google)
        } else {
            None
        }
    }

    /// Infer the provider from a raw payload. Non-JSON input yields `None`.
    #[must_use]
    pub fn detect(payload: &str) -> Option<Self> {
        let value = decode_payload(payload)?;
        Self::detect_value(&value)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extract the text delta carried by one SSE payload.
///
/// With `Some(provider)` only that provider's parser runs. With `None` the
/// payload shape is detected first. The terminal sentinel, malformed JSON and
/// payloads without text all yield `None`.
#[must_use]
pub fn parse_chunk(provider: Option<Provider>, payload: &str) -> Option<String> {
    if payload == DONE_SENTINEL {
        return None;
    }
    let value = decode_payload(payload)?;
    let provider = match provider {
        Some(provider) => provider,
        None => Provider::detect_value(&value)?,
    };
    extract_text(provider, &value).map(str::to_owned)
}

/// Run the parser for `provider` against a decoded payload.
#[must_use]
pub fn extract_text(provider: Provider, value: &Value) -> Option<&str> {
    let text = match provider {
        Provider::OpenAi => openai_chat::extract_text(value),
        Provider::Anthropic => anthropic::extract_text(value),
        Provider::Google => gemini::extract_text(value),
    }?;
    (!text.is_empty()).then_some(text)
}

#[inline]
pub(crate) fn decode_payload(payload: &str) -> Option<Value> {
    serde_json::from_str(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPENAI: &str = r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"Hi"}}]}"#;
    const ANTHROPIC: &str =
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#;
    const GOOGLE: &str = r#"{"candidates":[{"content":{"parts":[{"text":"Hi"}],"role":"model"}}]}"#;

    #[test]
    fn test_provider_from_model() {
        assert_eq!(Provider::from_model("claude-3-opus"), Provider::Anthropic);
        assert_eq!(Provider::from_model("Claude-Sonnet-4"), Provider::Anthropic);
        assert_eq!(Provider::from_model("gemini-1.5-pro"), Provider::Google);
        assert_eq!(Provider::from_model("gpt-4o-mini"), Provider::OpenAi);
        assert_eq!(Provider::from_model("llama-3-70b"), Provider::OpenAi);
        assert_eq!(Provider::from_model(""), Provider::OpenAi);
    }

    #[test]
    fn test_detectors_are_mutually_exclusive() {
        assert!(is_openai_shaped(OPENAI));
        assert!(!is_anthropic_shaped(OPENAI));
        assert!(!is_google_shaped(OPENAI));

        assert!(!is_openai_shaped(ANTHROPIC));
        assert!(is_anthropic_shaped(ANTHROPIC));
        assert!(!is_google_shaped(ANTHROPIC));

        assert!(!is_openai_shaped(GOOGLE));
        assert!(!is_anthropic_shaped(GOOGLE));
        assert!(is_google_shaped(GOOGLE));
    }

    #[test]
    fn test_detectors_reject_non_json() {
        for payload in ["", "not json", "[DONE]", "{\"choices\":", "42", "\"choices\""] {
            assert!(!is_openai_shaped(payload), "{payload}");
            assert!(!is_anthropic_shaped(payload), "{payload}");
            assert!(!is_google_shaped(payload), "{payload}");
        }
    }

    #[test]
    fn test_detect_order_prefers_openai() {
        let both = r#"{"choices":[],"candidates":[]}"#;
        assert_eq!(Provider::detect(both), Some(Provider::OpenAi));
        let anthropic_and_google = r#"{"type":"message_stop","candidates":[]}"#;
        assert_eq!(
            Provider::detect(anthropic_and_google),
            Some(Provider::Anthropic)
        );
        assert_eq!(Provider::detect(r#"{"foo":1}"#), None);
    }

    #[test]
    fn test_parse_chunk_with_hint() {
        assert_eq!(parse_chunk(Some(Provider::OpenAi), OPENAI).as_deref(), Some("Hi"));
        assert_eq!(
            parse_chunk(Some(Provider::Anthropic), ANTHROPIC).as_deref(),
            Some("Hi")
        );
        assert_eq!(parse_chunk(Some(Provider::Google), GOOGLE).as_deref(), Some("Hi"));
        // A hint that does not match the payload shape finds no text.
        assert_eq!(parse_chunk(Some(Provider::Google), OPENAI), None);
    }

    #[test]
    fn test_parse_chunk_auto_detect() {
        assert_eq!(parse_chunk(None, OPENAI).as_deref(), Some("Hi"));
        assert_eq!(parse_chunk(None, ANTHROPIC).as_deref(), Some("Hi"));
        assert_eq!(parse_chunk(None, GOOGLE).as_deref(), Some("Hi"));
        assert_eq!(parse_chunk(None, r#"{"unrelated":true}"#), None);
    }

    #[test]
    fn test_parse_chunk_done_and_garbage() {
        for provider in [
            None,
            Some(Provider::OpenAi),
            Some(Provider::Anthropic),
            Some(Provider::Google),
        ] {
            assert_eq!(parse_chunk(provider, "[DONE]"), None);
            assert_eq!(parse_chunk(provider, "{broken"), None);
        }
    }
}
