//! Google Gemini `streamGenerateContent` chunks.
//!
//! `data: {"candidates":[{"content":{"parts":[{"text":"..."}]}}]}`

use serde_json::Value;

/// True when the payload is a JSON object carrying a `candidates` key.
#[must_use]
pub fn is_google_shaped(payload: &str) -> bool {
    super::decode_payload(payload).is_some_and(|value| is_google_value(&value))
}

#[inline]
pub(crate) fn is_google_value(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|object| object.contains_key("candidates"))
}

/// `candidates[0].content.parts[0].text`.
#[must_use]
pub fn extract_text(value: &Value) -> Option<&str> {
    value
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
}

/// Parse one raw payload into its text delta.
#[must_use]
pub fn parse_google_chunk(payload: &str) -> Option<String> {
    super::parse_chunk(Some(super::Provider::Google), payload)
}
