//! Wire types for the Mnexium memory API.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::{LearnMode, MemoryOptions, SummarizeMode};

const UNTITLED_CONVERSATION: &str = "Untitled conversation";

/// Body of `POST /chat/completions`.
#[derive(Debug, Serialize)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: [UserMessage<'a>; 1],
    pub stream: bool,
    pub mnx: MnxPayload<'a>,
}

#[derive(Debug, Serialize)]
pub struct UserMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

/// Memory-control block attached to every completion request.
#[derive(Debug, Serialize)]
pub struct MnxPayload<'a> {
    pub subject_id: &'a str,
    pub chat_id: &'a str,
    pub history: bool,
    pub learn: LearnMode,
    pub recall: bool,
    pub profile: bool,
    pub summarize: SummarizeMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<&'a str>,
}

impl<'a> CompletionRequest<'a> {
    #[must_use]
    pub fn new(
        model: &'a str,
        message: &'a str,
        subject_id: &'a str,
        chat_id: &'a str,
        memory: &'a MemoryOptions,
    ) -> Self {
        Self {
            model,
            messages: [UserMessage {
                role: "user",
                content: message,
            }],
            stream: true,
            mnx: MnxPayload {
                subject_id,
                chat_id,
                history: memory.history,
                learn: memory.learn,
                recall: memory.recall,
                profile: memory.profile,
                summarize: memory.summarize,
                system_prompt: memory
                    .system_prompt
                    .as_deref()
                    .filter(|prompt| !prompt.is_empty()),
            },
        }
    }
}

/// Body of `GET /history/<subject_id>`.
///
/// Decoding is lenient: a malformed entry is dropped and a field of the
/// wrong type reads as absent, so one bad row never hides the others.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryResponse {
    #[serde(default, deserialize_with = "lenient_chats")]
    pub chats: Vec<ChatRecord>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub chat_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub updated_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_at: Option<String>,
}

fn lenient_chats<'de, D>(deserializer: D) -> Result<Vec<ChatRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// Strings pass through and numbers are rendered; anything else is `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

impl HistoryResponse {
    /// Identifier of the most recent conversation, if the upstream lists one.
    #[must_use]
    pub fn latest_chat_id(&self) -> Option<&str> {
        self.chats
            .first()
            .and_then(|chat| chat.chat_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    #[must_use]
    pub fn into_summaries(self) -> Vec<ConversationSummary> {
        self.chats
            .into_iter()
            .filter_map(|chat| {
                let id = chat.chat_id.filter(|id| !id.is_empty())?;
                let updated_at = chat
                    .updated_at
                    .filter(|ts| !ts.is_empty())
                    .or_else(|| chat.created_at.filter(|ts| !ts.is_empty()))
                    .unwrap_or_else(now_rfc3339);
                Some(ConversationSummary {
                    id,
                    title: chat
                        .title
                        .filter(|title| !title.is_empty())
                        .unwrap_or_else(|| UNTITLED_CONVERSATION.to_string()),
                    updated_at,
                })
            })
            .collect()
    }
}

/// One entry of the downstream `GET /history` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One entry of the downstream `GET /conversations/<chat_id>` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Extract user/assistant messages from a conversation-read response.
///
/// Compatibility shim: the upstream has been observed returning the list
/// under `messages`, under `history`, or as a bare array. All three are
/// accepted; anything else is an empty conversation.
#[must_use]
pub fn conversation_messages(body: &Value) -> Vec<ConversationMessage> {
    let raw = [body.get("messages"), body.get("history")]
        .into_iter()
        .flatten()
        .find(|candidate| is_truthy(candidate))
        .unwrap_or(body);
    let Some(items) = raw.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let role = match item.get("role").and_then(Value::as_str)? {
                "user" => MessageRole::User,
                "assistant" => MessageRole::Assistant,
                _ => return None,
            };
            let content = ["message", "content"]
                .into_iter()
                .filter_map(|key| item.get(key).and_then(Value::as_str))
                .find(|text| !text.is_empty())?;
            Some(ConversationMessage {
                role,
                content: content.to_string(),
            })
        })
        .collect()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
