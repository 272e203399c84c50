//! Chat transcript types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::ContentPlan;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One transcript entry.
///
/// Plans attached to an assistant message live only in memory; the persisted
/// transcript keeps role, content and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub plans: Vec<ContentPlan>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            plans: Vec::new(),
        }
    }
}

/// Message as sent to the chat endpoint
#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Append an assistant text delta: extend the last message if it is the
/// assistant's, otherwise start a new assistant message.
pub fn apply_delta(messages: &mut Vec<ChatMessage>, delta: &str) {
    match messages.last_mut() {
        Some(last) if last.role == Role::Assistant => last.content.push_str(delta),
        _ => messages.push(ChatMessage::assistant(delta)),
    }
}
