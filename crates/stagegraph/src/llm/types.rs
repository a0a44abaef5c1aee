//! Role-tagged chat messages.

use serde::{Deserialize, Serialize};

/// Role of a single message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One message in a prompt or in a session's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// `[system, user]`: the prompt shape used by single-shot stages.
    pub fn prompt(system: impl Into<String>, user: impl Into<String>) -> Vec<Self> {
        vec![Self::system(system), Self::user(user)]
    }
}

/// One streamed increment: model reasoning (when the service exposes it) or
/// answer text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDelta {
    Reasoning(String),
    Text(String),
}
