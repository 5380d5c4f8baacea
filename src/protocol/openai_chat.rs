//! OpenAI chat-completions stream chunks.
//!
//! `data: {"choices":[{"delta":{"content":"text"}}]}`

use serde_json::Value;

/// True when the payload is a JSON object carrying a `choices` key.
#[must_use]
pub fn is_openai_shaped(payload: &str) -> bool {
    super::decode_payload(payload).is_some_and(|value| is_openai_value(&value))
}

#[inline]
pub(crate) fn is_openai_value(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|object| object.contains_key("choices"))
}

/// `choices[0].delta.content`.
#[must_use]
pub fn extract_text(value: &Value) -> Option<&str> {
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
}

/// Parse one raw payload into its text delta.
#[must_use]
pub fn parse_openai_chunk(payload: &str) -> Option<String> {
    super::parse_chunk(Some(super::Provider::OpenAi), payload)
}
