use serde::{Deserialize, Serialize};

pub mod remote;

/// Role of one conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged message in the rotating conversation state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Completion-service faults, split by how callers must react:
/// authentication failures terminate the controller, service faults are
/// transient and left to the caller's retry policy.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion service rejected credentials: {0}")]
    Authentication(String),
    #[error("completion service error: {0}")]
    Service(String),
}

/// Core trait for chat-completion providers
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync {
    /// Sends the full turn sequence and returns the assistant's reply text.
    /// In streaming mode all produced fragments are concatenated into one
    /// result before returning.
    async fn complete(&self, turns: &[ChatTurn], stream: bool) -> Result<String, CompletionError>;
}
