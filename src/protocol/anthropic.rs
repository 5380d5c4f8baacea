//! Anthropic Messages stream events.
//!
//! Anthropic frames each event as `event: <name>\ndata: {"type":"<name>",...}`.
//! Only `content_block_delta` events with a `text_delta` carry text.

use serde_json::Value;

/// Event names that mark a payload as Anthropic-shaped.
pub const ANTHROPIC_EVENT_TYPES: [&str; 6] = [
    "message_start",
    "content_block_start",
    "content_block_delta",
    "content_block_stop",
    "message_delta",
    "message_stop",
];

/// True when the payload is a JSON object whose `type` names an Anthropic
/// stream event.
#[must_use]
pub fn is_anthropic_shaped(payload: &str) -> bool {
    super::decode_payload(payload).is_some_and(|value| is_anthropic_value(&value))
}

#[inline]
pub(crate) fn is_anthropic_value(value: &Value) -> bool {
    value
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|kind| ANTHROPIC_EVENT_TYPES.contains(&kind))
}

/// `delta.text` of a `content_block_delta` / `text_delta` event.
#[must_use]
pub fn extract_text(value: &Value) -> Option<&str> {
    if value.get("type")?.as_str()? != "content_block_delta" {
        return None;
    }
    let delta = value.get("delta")?;
    if delta.get("type")?.as_str()? != "text_delta" {
        return None;
    }
    delta.get("text")?.as_str()
}

/// Parse one raw payload into its text delta.
#[must_use]
pub fn parse_anthropic_chunk(payload: &str) -> Option<String> {
    super::parse_chunk(Some(super::Provider::Anthropic), payload)
}
