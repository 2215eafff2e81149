use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

use crate::anthropic::{AnthropicClient, CompletionClient, SystemContext};
use crate::assistant::Assistant;
use crate::config::AppConfig;
use crate::db::{Agent, Conversation, ConversationStore, Message, SqliteStore};
use crate::error::{ChatError, Result};
use crate::logging;
use crate::route::{Route, NOT_FOUND_PATH};
use crate::session::{ChatSession, CompletionRequest, PreparedSend, SendOutcome, SessionController};
use crate::settings::Settings;
use crate::topics::Topic;

/// Anthropic client that can be installed after startup, once a key is known.
#[derive(Default)]
pub struct KeyedClient {
    inner: RwLock<Option<Arc<AnthropicClient>>>,
}

impl KeyedClient {
    fn install(&self, client: AnthropicClient) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = Some(Arc::new(client));
        }
    }

    fn current(&self) -> Result<Arc<AnthropicClient>> {
        self.inner
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or_else(|| ChatError::config("Anthropic API key not set"))
    }
}

#[async_trait]
impl CompletionClient for KeyedClient {
    async fn get_chat_completion(
        &self,
        agent: &Agent,
        history: &[Message],
        new_message: &str,
        system_context: &SystemContext,
    ) -> Result<String> {
        let client = self.current()?;
        client
            .get_chat_completion(agent, history, new_message, system_context)
            .await
    }
}

pub struct AppState {
    config: AppConfig,
    controller: SessionController<SqliteStore, KeyedClient>,
    session: Mutex<Option<ChatSession>>,
}

impl AppState {
    pub fn new(config: AppConfig, store: SqliteStore) -> Result<Self> {
        let client = KeyedClient::default();
        if let Some(key) = config.anthropic_key.as_deref() {
            client.install(AnthropicClient::new(key, &config.model, config.max_tokens)?);
        }

        let controller = SessionController::new(store, client, config.user_id.clone())
            .with_history_limit(config.history_limit);

        Ok(Self {
            config,
            controller,
            session: Mutex::new(None),
        })
    }
}

fn open_session(session: &mut Option<ChatSession>) -> std::result::Result<&mut ChatSession, String> {
    session.as_mut().ok_or_else(|| "No chat is open".to_string())
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OpenChatResult {
    Opened { session: ChatSession },
    Redirect { path: String },
}

// ============ Navigation ============

#[tauri::command]
pub async fn open_agent_chat(state: tauri::State<'_, AppState>, path: String) -> std::result::Result<OpenChatResult, String> {
    let (agent_id, conversation_id) = match Route::parse(&path) {
        Route::AgentChat { agent_id, conversation_id } => (agent_id, conversation_id),
        Route::NotFound => {
            logging::log_session(None, &format!("No assistant in '{}', redirecting", path));
            return Ok(OpenChatResult::Redirect {
                path: NOT_FOUND_PATH.to_string(),
            });
        }
    };

    let session = state
        .controller
        .bootstrap(&agent_id, conversation_id.as_deref())
        .await
        .map_err(|e| e.to_string())?;

    *state.session.lock().await = Some(session.clone());
    Ok(OpenChatResult::Opened { session })
}

#[tauri::command]
pub fn list_topics(agent_id: String) -> std::result::Result<Vec<Topic>, String> {
    let assistant = Assistant::from_str(&agent_id)
        .ok_or_else(|| ChatError::AgentNotFound(agent_id.clone()).to_string())?;
    Ok(assistant.topics().to_vec())
}

// ============ Chat ============

#[tauri::command]
pub async fn select_topic(state: tauri::State<'_, AppState>, topic_id: String) -> std::result::Result<ChatSession, String> {
    let mut guard = state.session.lock().await;
    let session = open_session(&mut guard)?;
    state
        .controller
        .select_topic(session, &topic_id)
        .await
        .map_err(|e| e.to_string())?;
    Ok(session.clone())
}

#[tauri::command]
pub async fn send_message(state: tauri::State<'_, AppState>, text: String) -> std::result::Result<SendOutcome, String> {
    let request = {
        let mut guard = state.session.lock().await;
        let session = open_session(&mut guard)?;
        match state
            .controller
            .begin_send(session, &text)
            .await
            .map_err(|e| e.to_string())?
        {
            PreparedSend::AwaitConsent => return Ok(SendOutcome::ConsentRequired),
            PreparedSend::Request(request) => request,
        }
    };

    complete_unlocked(&state, request).await.map(SendOutcome::Replied)
}

#[tauri::command]
pub async fn resolve_consent(state: tauri::State<'_, AppState>, granted: bool) -> std::result::Result<Message, String> {
    let request = {
        let mut guard = state.session.lock().await;
        let session = open_session(&mut guard)?;
        state
            .controller
            .begin_consent(session, granted)
            .map_err(|e| e.to_string())?
    };

    complete_unlocked(&state, request).await
}

/// Run the completion with the session unlocked so `get_session` sees `is_typing`.
async fn complete_unlocked(state: &AppState, request: CompletionRequest) -> std::result::Result<Message, String> {
    let result = state.controller.request_completion(&request).await;

    let mut guard = state.session.lock().await;
    let outcome = match guard.as_mut() {
        Some(session) => state.controller.finish_completion(session, &request, result).await,
        None => state.controller.record_reply(&request, result).await,
    };
    outcome.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn new_conversation(state: tauri::State<'_, AppState>) -> std::result::Result<ChatSession, String> {
    let mut guard = state.session.lock().await;
    let session = open_session(&mut guard)?;
    state.controller.new_conversation(session);
    Ok(session.clone())
}

#[tauri::command]
pub async fn get_session(state: tauri::State<'_, AppState>) -> std::result::Result<Option<ChatSession>, String> {
    Ok(state.session.lock().await.clone())
}

// ============ Conversations ============

#[tauri::command]
pub async fn list_conversations(
    state: tauri::State<'_, AppState>,
    agent_id: String,
    limit: usize,
) -> std::result::Result<Vec<Conversation>, String> {
    state
        .controller
        .store()
        .get_recent_conversations(&agent_id, limit)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn delete_conversation(state: tauri::State<'_, AppState>, conversation_id: String) -> std::result::Result<(), String> {
    state
        .controller
        .store()
        .delete_conversation(&conversation_id)
        .await
        .map_err(|e| e.to_string())?;

    let mut guard = state.session.lock().await;
    if let Some(session) = guard.as_mut() {
        if session.conversation_id.as_deref() == Some(conversation_id.as_str()) {
            session.reset_to_topic_selection();
        }
    }
    logging::log_session(Some(&conversation_id), "Conversation deleted");
    Ok(())
}

// ============ Settings ============

#[tauri::command]
pub async fn save_settings(state: tauri::State<'_, AppState>, settings: Settings) -> std::result::Result<(), String> {
    state
        .controller
        .store()
        .save_agent_settings(&settings)
        .await
        .map_err(|e| e.to_string())?;
    logging::log_settings(None, &format!("Saved {} fields for {}", settings.values.len(), settings.agent_id));

    let mut guard = state.session.lock().await;
    if let Some(session) = guard.as_mut() {
        if session.agent.id == settings.agent_id {
            state.controller.refresh_settings(session).await;
        }
    }
    Ok(())
}

#[tauri::command]
pub async fn validate_api_key(state: tauri::State<'_, AppState>, api_key: String) -> std::result::Result<bool, String> {
    let client = AnthropicClient::new(&api_key, &state.config.model, state.config.max_tokens)
        .map_err(|e| e.to_string())?;

    let valid = client.validate_api_key().await.map_err(|e| e.to_string())?;
    if valid {
        state.controller.client().install(client);
        logging::log_agent(None, "Anthropic API key validated and installed");
    }
    Ok(valid)
}
