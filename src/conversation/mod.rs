//! Conversation types: thread messages, transcript entries and stored records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Maximum number of characters kept from the first message when deriving a title
pub const TITLE_MAX_CHARS: usize = 50;

/// Title used for a conversation with no messages
pub const DEFAULT_TITLE: &str = "New Chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single entry of the transcript sent to the completion endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A message in a conversation thread, as shown to the user and persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "new_message_id")]
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        // Thread messages are never system-authored
        let role = match msg.role {
            Role::User => Role::User,
            Role::System | Role::Assistant => Role::Assistant,
        };
        Self {
            role,
            content: msg.content.clone(),
        }
    }
}

/// One persisted chat session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: String,
    pub title: String,
    #[serde(rename = "character", alias = "personaId")]
    pub persona_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationRecord {
    pub fn new(title: impl Into<String>, persona_id: impl Into<String>, messages: Vec<Message>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            persona_id: persona_id.into(),
            messages,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Derive a conversation title from its first message
pub fn derive_title(messages: &[Message]) -> String {
    let Some(first) = messages.first() else {
        return DEFAULT_TITLE.to_string();
    };

    let content = first.content.trim();
    if content.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    let mut chars = content.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Convert client-supplied history into transcript entries.
///
/// Anything that isn't an array is treated as no history. Entries are
/// sanitized rather than rejected: only `"user"` keeps the user role and
/// content is coerced to a string.
pub fn sanitize_history(history: &Value) -> Vec<ChatMessage> {
    let Some(entries) = history.as_array() else {
        return Vec::new();
    };

    entries
        .iter()
        .map(|entry| {
            let role = match entry.get("role").and_then(Value::as_str) {
                Some("user") => Role::User,
                _ => Role::Assistant,
            };
            let content = coerce_content(entry.get("content").unwrap_or(&Value::Null));
            ChatMessage { role, content }
        })
        .collect()
}

fn coerce_content(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(false) => String::new(),
        Value::Bool(true) => "true".to_string(),
        Value::Number(n) if n.as_f64() == Some(0.0) => String::new(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
