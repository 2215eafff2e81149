use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::context::ContextMap;
use crate::db::{Agent, Message, SenderType};
use crate::error::{ChatError, Result};
use crate::prompts::compose_system_prompt;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT_SECS: u64 = 60;

// Model constants
pub const CLAUDE_HAIKU: &str = "claude-3-5-haiku-20241022";
pub const CLAUDE_SONNET: &str = "claude-sonnet-4-20250514";

/// Stand-in opener when a conversation starts with the assistant's intro.
const CONVERSATION_START: &str = "(The user opened this conversation.)";

/// Everything the completion call needs beyond the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemContext {
    pub user_id: String,
    pub available_context: ContextMap,
    pub use_admin_settings: bool,
    pub permission_granted: bool,
    pub manual_mode: bool,
    pub custom_instructions: Option<String>,
    /// Topic instruction stored with the conversation
    pub system_instruction: Option<String>,
}

/// Request/response call to a language model.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn get_chat_completion(
        &self,
        agent: &Agent,
        history: &[Message],
        new_message: &str,
        system_context: &SystemContext,
    ) -> Result<String>;
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

pub struct AnthropicClient {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(api_key: &str, model: &str, max_tokens: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ChatError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens,
        })
    }

    /// Send a chat completion request to Claude
    pub async fn chat_completion(
        &self,
        system_prompt: Option<&str>,
        messages: Vec<AnthropicMessage>,
        temperature: f32,
    ) -> Result<String> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: system_prompt.map(|s| s.to_string()),
            messages,
            temperature: Some(temperature),
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;

            // Try to parse structured error
            if let Ok(parsed_error) = serde_json::from_str::<AnthropicError>(&error_text) {
                return Err(ChatError::completion(format!(
                    "Anthropic API error ({}): {} - {}",
                    status, parsed_error.error.error_type, parsed_error.error.message
                )));
            }

            return Err(ChatError::completion(format!(
                "Anthropic API error ({}): {}",
                status, error_text
            )));
        }

        let completion: MessagesResponse = response.json().await?;

        completion
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .last()
            .and_then(|c| c.text.clone())
            .ok_or_else(|| ChatError::completion("No text response from Claude"))
    }

    /// Validate the Anthropic API key with a tiny request
    pub async fn validate_api_key(&self) -> Result<bool> {
        let request = MessagesRequest {
            model: CLAUDE_HAIKU.to_string(),
            max_tokens: 10,
            system: None,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: "Say 'ok'".to_string(),
            }],
            temperature: Some(0.0),
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(true);
        }

        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 => Ok(false),
            429 => Err(ChatError::completion("Rate limited - too many requests")),
            _ => {
                if let Ok(parsed_error) = serde_json::from_str::<AnthropicError>(&error_text) {
                    return Err(ChatError::completion(format!(
                        "{}: {}",
                        parsed_error.error.error_type, parsed_error.error.message
                    )));
                }
                Err(ChatError::completion(format!(
                    "Anthropic API error ({}): {}",
                    status, error_text
                )))
            }
        }
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn get_chat_completion(
        &self,
        agent: &Agent,
        history: &[Message],
        new_message: &str,
        system_context: &SystemContext,
    ) -> Result<String> {
        let system_prompt = compose_system_prompt(agent, system_context);
        let messages = build_messages(history, new_message);
        self.chat_completion(Some(&system_prompt), messages, 0.7).await
    }
}

/// Convert the transcript into Messages API turns.
///
/// The API wants alternating roles starting with the user, so consecutive
/// turns from the same side are merged and a synthetic opener is inserted
/// when the transcript starts with the assistant's intro.
pub fn build_messages(history: &[Message], new_message: &str) -> Vec<AnthropicMessage> {
    let mut messages: Vec<AnthropicMessage> = Vec::with_capacity(history.len() + 2);

    let turns = history
        .iter()
        .map(|m| (m.sender_type, m.content.as_str()))
        .chain(std::iter::once((SenderType::User, new_message)));

    for (sender, content) in turns {
        let role = match sender {
            SenderType::User => "user",
            SenderType::Agent => "assistant",
        };

        if messages.is_empty() && role == "assistant" {
            messages.push(AnthropicMessage {
                role: "user".to_string(),
                content: CONVERSATION_START.to_string(),
            });
        }

        match messages.last_mut() {
            Some(last) if last.role == role => {
                last.content = format!("{}\n\n{}", last.content, content);
            }
            _ => messages.push(AnthropicMessage {
                role: role.to_string(),
                content: content.to_string(),
            }),
        }
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(sender_type: SenderType, content: &str) -> Message {
        Message {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: "c1".to_string(),
            sender_type,
            content: content.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn test_build_messages_inserts_opener_before_intro() {
        let history = vec![msg(SenderType::Agent, "Hi, I'm your CFO.")];
        let messages = build_messages(&history, "How long is my runway?");

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].content, CONVERSATION_START);
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[2].role, "user");
        assert_eq!(messages[2].content, "How long is my runway?");
    }

    #[test]
    fn test_build_messages_merges_consecutive_user_turns() {
        // a failed send leaves a user message without a reply
        let history = vec![
            msg(SenderType::Agent, "intro"),
            msg(SenderType::User, "first try"),
        ];
        let messages = build_messages(&history, "second try");

        let last = messages.last().unwrap();
        assert_eq!(last.role, "user");
        assert_eq!(last.content, "first try\n\nsecond try");
    }

    #[test]
    fn test_build_messages_without_history() {
        let messages = build_messages(&[], "hello");
        assert_eq!(
            messages,
            vec![AnthropicMessage {
                role: "user".to_string(),
                content: "hello".to_string()
            }]
        );
    }
}
