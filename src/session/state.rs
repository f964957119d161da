//! Session state, conversational mode and the conversation log

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Activation state of the assistant session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Not listening for commands
    Dormant,
    /// Passively listening for the wake token
    WakeListening,
    /// Awake, waiting for input
    Active,
    /// Awake and capturing a voice command
    ActiveListening,
    /// Waiting for the backend to answer a turn
    Processing,
}

impl SessionState {
    /// Whether the assistant is awake (any state other than dormant/wake listening)
    #[must_use]
    pub const fn is_awake(self) -> bool {
        matches!(self, Self::Active | Self::ActiveListening | Self::Processing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dormant => "dormant",
            Self::WakeListening => "wake_listening",
            Self::Active => "active",
            Self::ActiveListening => "active_listening",
            Self::Processing => "processing",
        };
        f.write_str(name)
    }
}

/// Special conversational flow in effect while the session is awake
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    General,
    LearningRoutine,
    PlanningDay,
}

impl Mode {
    /// Wire name, as sent in the chat `context` field
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::LearningRoutine => "learning_routine",
            Self::PlanningDay => "planning_day",
        }
    }

    /// Parse a wire name
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "general" => Some(Self::General),
            "learning_routine" | "routine" => Some(Self::LearningRoutine),
            "planning_day" | "plan" => Some(Self::PlanningDay),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in the session's conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(
        rename = "responseType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub response_type: Option<String>,
}

impl ConversationMessage {
    /// New user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            response_type: None,
        }
    }

    /// New assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>, response_type: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            response_type,
        }
    }
}

/// Append-only, in-memory conversation for the current process
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ConversationMessage>,
}

impl Conversation {
    /// Append a message and return a reference to it
    pub fn push(&mut self, message: ConversationMessage) -> &ConversationMessage {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// All messages in append order
    #[must_use]
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent message, if any
    #[must_use]
    pub fn last(&self) -> Option<&ConversationMessage> {
        self.messages.last()
    }
}
