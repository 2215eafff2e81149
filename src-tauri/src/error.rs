//! Error types shared by the store, the completion client and the session controller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ChatError {
    /// The requested assistant does not exist in the store
    #[error("Assistant not found: {0}")]
    AgentNotFound(String),

    /// Messages of an existing conversation could not be loaded
    #[error("Failed to load message history: {0}")]
    HistoryLoad(String),

    /// The remote conversation record could not be created
    #[error("Failed to create conversation: {0}")]
    ConversationCreate(String),

    /// The language-model call failed
    #[error("Completion failed: {0}")]
    Completion(String),

    /// Assistant settings could not be loaded (non-fatal, degrades to empty context)
    #[error("Failed to load settings: {0}")]
    SettingsLoad(String),

    #[error("Unknown topic '{topic}' for {assistant}")]
    UnknownTopic { assistant: String, topic: String },

    #[error("A message is already waiting for a consent decision")]
    ConsentPending,

    #[error("No message is waiting for a consent decision")]
    NoPendingMessage,

    #[error("A reply is still pending")]
    Busy,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("No conversation is open")]
    NoConversation,

    /// Generic persistence failure
    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChatError {
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    pub fn completion(message: impl Into<String>) -> Self {
        Self::Completion(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether the error should be shown to the user in the conversation view.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, ChatError::SettingsLoad(_))
    }
}

impl From<rusqlite::Error> for ChatError {
    fn from(err: rusqlite::Error) -> Self {
        ChatError::Store(err.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Completion(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_load_is_not_user_visible() {
        assert!(!ChatError::SettingsLoad("boom".into()).is_user_visible());
        assert!(ChatError::Completion("boom".into()).is_user_visible());
        assert!(ChatError::AgentNotFound("cxo".into()).is_user_visible());
    }

    #[test]
    fn test_sqlite_error_maps_to_store() {
        let err: ChatError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, ChatError::Store(_)));
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let json = serde_json::to_value(ChatError::AgentNotFound("cxo".into())).unwrap();
        assert_eq!(json["kind"], "agent_not_found");
        assert_eq!(json["detail"], "cxo");
    }
}
