//! Message model for the append-only conversation log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::ids::{MessageId, SessionId};

/// Role of a logged message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// User input.
    User,
    /// Assistant response.
    Assistant,
    /// System message.
    System,
    /// Tool output.
    Tool,
}

impl ChatRole {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChatRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            "tool" => Ok(Self::Tool),
            _ => Err(value.to_string()),
        }
    }
}

/// One turn as handed to summarizers and model callers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Role of the turn.
    pub role: ChatRole,
    /// Content payload.
    pub content: String,
}

impl ChatTurn {
    /// Build a turn with an explicit role.
    #[must_use]
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Build a system turn (system prompts, injected summaries).
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }
}

/// A single logged message.
///
/// Created once on append, immutable, never deleted. Ordering within a
/// session is by [`MessageId`]; `created_at` is an audit column only.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Store-assigned id, contiguous from 1 within the session.
    pub id: MessageId,
    /// Session this message belongs to.
    pub session_id: SessionId,
    /// Role of the message.
    pub role: ChatRole,
    /// Content payload.
    pub content: String,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Project the message onto its `{role, content}` turn.
    #[must_use]
    pub fn turn(&self) -> ChatTurn {
        ChatTurn::new(self.role, self.content.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_storage_form() {
        for role in [
            ChatRole::User,
            ChatRole::Assistant,
            ChatRole::System,
            ChatRole::Tool,
        ] {
            assert_eq!(role.as_str().parse::<ChatRole>(), Ok(role));
        }
    }

    #[test]
    fn role_rejects_unknown_storage_form() {
        assert_eq!("narrator".parse::<ChatRole>(), Err("narrator".to_string()));
    }

    #[test]
    fn message_projects_onto_turn() {
        let message = ChatMessage {
            id: MessageId::new(3),
            session_id: SessionId::default(),
            role: ChatRole::Assistant,
            content: "hello".to_string(),
            created_at: Utc::now(),
        };
        assert_eq!(
            message.turn(),
            ChatTurn::new(ChatRole::Assistant, "hello")
        );
    }
}
