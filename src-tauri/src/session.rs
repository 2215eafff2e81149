//! Chat session controller
//!
//! A `ChatSession` holds everything one open chat view needs (assistant,
//! conversation, messages, consent). The `SessionController` owns the store
//! and the completion client and drives the session through bootstrap, topic
//! commit, send and consent resolution. A send is split into `begin_*`,
//! `request_completion` and `finish_completion` so a caller sharing the
//! session can release it during the network call; `is_typing` stays set in
//! between and rejects further sends with `ChatError::Busy`.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::anthropic::{CompletionClient, SystemContext};
use crate::consent::{ConsentGate, ContextResolution, GateDecision};
use crate::context::{extract_context, ContextMap};
use crate::db::{Agent, ConversationStore, Message, SenderType};
use crate::error::{ChatError, Result};
use crate::logging;
use crate::prompts::{build_intro_message, build_topic_prompt};
use crate::settings::{Settings, SettingsSource};
use crate::topics::Topic;

const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionView {
    TopicSelection,
    Chatting,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatSession {
    pub agent: Agent,
    pub view: SessionView,
    pub conversation_id: Option<String>,
    pub topic_id: Option<String>,
    pub messages: Vec<Message>,
    pub settings: Option<Settings>,
    pub context: ContextMap,
    pub consent: ConsentGate,
    pub system_instruction: Option<String>,
    pub is_typing: bool,
    pub error: Option<ChatError>,
}

impl ChatSession {
    fn new(agent: Agent, settings: Option<Settings>) -> Self {
        let context = extract_context(settings.as_ref());
        Self {
            agent,
            view: SessionView::TopicSelection,
            conversation_id: None,
            topic_id: None,
            messages: Vec::new(),
            settings,
            context,
            consent: ConsentGate::new(),
            system_instruction: None,
            is_typing: false,
            error: None,
        }
    }

    pub fn topics(&self) -> &'static [Topic] {
        self.agent.assistant.topics()
    }

    pub fn awaiting_consent(&self) -> bool {
        self.consent.is_awaiting()
    }

    /// Drop the open conversation and go back to topic selection.
    pub fn reset_to_topic_selection(&mut self) {
        self.view = SessionView::TopicSelection;
        self.conversation_id = None;
        self.topic_id = None;
        self.messages.clear();
        self.consent.reset();
        self.system_instruction = None;
        self.is_typing = false;
        self.error = None;
    }

    fn build_system_context(&self, user_id: &str, resolution: ContextResolution) -> SystemContext {
        let available_context = if resolution.permission_granted() {
            self.context.clone()
        } else {
            ContextMap::new()
        };

        SystemContext {
            user_id: user_id.to_string(),
            available_context,
            use_admin_settings: self
                .settings
                .as_ref()
                .is_some_and(|s| s.source == SettingsSource::Admin),
            permission_granted: resolution.permission_granted(),
            manual_mode: resolution.manual_mode(),
            custom_instructions: self
                .settings
                .as_ref()
                .and_then(|s| s.custom_instructions())
                .map(str::to_string),
            system_instruction: self.system_instruction.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum SendOutcome {
    /// The assistant answered; the reply is already in the session
    Replied(Message),
    /// The message is parked until the user answers the consent prompt
    ConsentRequired,
}

/// A completion call captured from the session, so it can run without
/// holding on to the session.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub conversation_id: String,
    pub agent: Agent,
    pub history: Vec<Message>,
    pub new_message: String,
    pub system_context: SystemContext,
}

#[derive(Debug, Clone)]
pub enum PreparedSend {
    AwaitConsent,
    Request(CompletionRequest),
}

pub struct SessionController<S, C> {
    store: S,
    client: C,
    user_id: String,
    history_limit: usize,
}

impl<S: ConversationStore, C: CompletionClient> SessionController<S, C> {
    pub fn new(store: S, client: C, user_id: impl Into<String>) -> Self {
        Self {
            store,
            client,
            user_id: user_id.into(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Open a chat with an assistant, resuming `conversation_id` when it has messages.
    pub async fn bootstrap(&self, agent_id: &str, conversation_id: Option<&str>) -> Result<ChatSession> {
        let agent = self.store.get_agent_by_id(agent_id).await.map_err(|e| {
            logging::log_error(conversation_id, &format!("Failed to load assistant {}: {}", agent_id, e));
            e
        })?;

        let settings = self.load_settings(&agent).await;
        let mut session = ChatSession::new(agent, settings);

        let Some(conversation_id) = conversation_id else {
            logging::log_session(None, &format!("Opened {} at topic selection", session.agent.name));
            return Ok(session);
        };

        match self.store.get_messages_by_conversation_id(conversation_id).await {
            Ok(messages) if !messages.is_empty() => {
                let conversation = match self.store.get_conversation(conversation_id).await {
                    Ok(Some(conversation)) if conversation.agent_id == session.agent.id => conversation,
                    Ok(Some(conversation)) => {
                        logging::log_session(Some(conversation_id), &format!(
                            "Conversation belongs to {}, not {}; falling back to topic selection",
                            conversation.agent_id, session.agent.id
                        ));
                        return Ok(session);
                    }
                    Ok(None) => {
                        logging::log_session(Some(conversation_id), "No conversation record, falling back to topic selection");
                        return Ok(session);
                    }
                    Err(e) => {
                        logging::log_error(Some(conversation_id), &format!("Failed to load conversation record: {}", e));
                        session.error = Some(ChatError::HistoryLoad(e.to_string()));
                        return Ok(session);
                    }
                };

                logging::log_session(Some(conversation_id), &format!(
                    "Resumed conversation with {} messages", messages.len()
                ));

                session.view = SessionView::Chatting;
                session.conversation_id = Some(conversation.id);
                session.topic_id = conversation.topic_id;
                session.system_instruction = conversation.system_instruction;
                session.messages = messages;
            }
            Ok(_) => {
                logging::log_session(Some(conversation_id), "No stored messages, falling back to topic selection");
            }
            Err(e) => {
                logging::log_error(Some(conversation_id), &format!("Failed to load history: {}", e));
                session.error = Some(match e {
                    ChatError::HistoryLoad(_) => e,
                    other => ChatError::HistoryLoad(other.to_string()),
                });
            }
        }

        Ok(session)
    }

    /// Start a new conversation on the chosen topic.
    pub async fn select_topic(&self, session: &mut ChatSession, topic_id: &str) -> Result<()> {
        if session.is_typing {
            return Err(ChatError::Busy);
        }

        let assistant = session.agent.assistant;
        let topic = assistant.find_topic(topic_id).ok_or_else(|| ChatError::UnknownTopic {
            assistant: assistant.as_str().to_string(),
            topic: topic_id.to_string(),
        })?;

        let conversation = match self
            .store
            .create_conversation(&self.user_id, &session.agent.id, topic.label)
            .await
        {
            Ok(conversation) => conversation,
            Err(e) => {
                let err = match e {
                    ChatError::ConversationCreate(_) => e,
                    other => ChatError::ConversationCreate(other.to_string()),
                };
                logging::log_error(None, &err.to_string());
                session.error = Some(err.clone());
                return Err(err);
            }
        };

        let intro = build_intro_message(topic, assistant, session.settings.as_ref());
        let instruction = build_topic_prompt(topic, assistant, session.settings.as_ref());

        if let Err(e) = self
            .store
            .set_conversation_topic(&conversation.id, topic.id, &instruction)
            .await
        {
            logging::log_error(Some(&conversation.id), &format!("Failed to store system instruction: {}", e));
        }

        let intro_message = self.persist(&conversation.id, SenderType::Agent, &intro).await;

        logging::log_session(Some(&conversation.id), &format!(
            "Started {} conversation on topic '{}'", assistant.as_str(), topic.id
        ));

        session.reset_to_topic_selection();
        session.view = SessionView::Chatting;
        session.conversation_id = Some(conversation.id);
        session.topic_id = Some(topic.id.to_string());
        session.system_instruction = Some(instruction);
        session.messages.push(intro_message);

        Ok(())
    }

    /// Send a user message, or park it behind the consent prompt.
    pub async fn send_message(&self, session: &mut ChatSession, text: &str) -> Result<SendOutcome> {
        match self.begin_send(session, text).await? {
            PreparedSend::AwaitConsent => Ok(SendOutcome::ConsentRequired),
            PreparedSend::Request(request) => {
                let result = self.request_completion(&request).await;
                self.finish_completion(session, &request, result)
                    .await
                    .map(SendOutcome::Replied)
            }
        }
    }

    /// Apply the user's consent choice and send the parked message.
    pub async fn resolve_consent(&self, session: &mut ChatSession, granted: bool) -> Result<Message> {
        let request = self.begin_consent(session, granted)?;
        let result = self.request_completion(&request).await;
        self.finish_completion(session, &request, result).await
    }

    /// Validate and record a user message. When it can be answered right away
    /// the session is marked typing and the request to run is returned.
    pub async fn begin_send(&self, session: &mut ChatSession, text: &str) -> Result<PreparedSend> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if session.is_typing {
            return Err(ChatError::Busy);
        }
        if session.consent.is_awaiting() {
            return Err(ChatError::ConsentPending);
        }
        let conversation_id = session.conversation_id.clone().ok_or(ChatError::NoConversation)?;

        let decision = session.consent.submit(text, !session.context.is_empty())?;

        session.error = None;
        let user_message = self.persist(&conversation_id, SenderType::User, text).await;
        session.messages.push(user_message);

        match decision {
            GateDecision::AwaitConsent => {
                logging::log_consent(Some(&conversation_id), &format!(
                    "Asking for consent to use {} stored fields", session.context.len()
                ));
                Ok(PreparedSend::AwaitConsent)
            }
            GateDecision::Proceed(resolution) => self
                .prepare_request(session, text, resolution)
                .map(PreparedSend::Request),
        }
    }

    /// Resolve the consent prompt and prepare the parked message for sending.
    pub fn begin_consent(&self, session: &mut ChatSession, granted: bool) -> Result<CompletionRequest> {
        if session.is_typing {
            return Err(ChatError::Busy);
        }

        let (pending, resolution) = session.consent.resolve(granted)?;
        logging::log_consent(session.conversation_id.as_deref(), &format!(
            "Consent {}", if granted { "granted" } else { "denied, manual mode" }
        ));

        self.prepare_request(session, &pending.content, resolution)
    }

    /// Run the completion call. Needs no access to the session.
    pub async fn request_completion(&self, request: &CompletionRequest) -> Result<String> {
        logging::log_agent(Some(&request.conversation_id), &format!(
            "Requesting completion ({} history messages, permission_granted={}, manual_mode={})",
            request.history.len(),
            request.system_context.permission_granted,
            request.system_context.manual_mode
        ));

        self.client
            .get_chat_completion(
                &request.agent,
                &request.history,
                &request.new_message,
                &request.system_context,
            )
            .await
            .map_err(|e| match e {
                ChatError::Completion(_) => e,
                other => ChatError::Completion(other.to_string()),
            })
    }

    /// Persist the reply and apply the outcome to the session.
    ///
    /// If the session moved to another conversation in the meantime, the
    /// reply is still stored but the session is left alone.
    pub async fn finish_completion(
        &self,
        session: &mut ChatSession,
        request: &CompletionRequest,
        result: Result<String>,
    ) -> Result<Message> {
        let outcome = self.record_reply(request, result).await;

        if session.conversation_id.as_deref() != Some(request.conversation_id.as_str()) {
            logging::log_session(Some(&request.conversation_id), "Reply arrived after the conversation was closed");
            return outcome;
        }

        session.is_typing = false;
        match &outcome {
            Ok(message) => {
                session.messages.push(message.clone());
                session.error = None;
            }
            Err(e) => session.error = Some(e.clone()),
        }
        outcome
    }

    /// Store the reply for the request's conversation, or log the failure.
    pub async fn record_reply(&self, request: &CompletionRequest, result: Result<String>) -> Result<Message> {
        match result {
            Ok(reply) => Ok(self.persist(&request.conversation_id, SenderType::Agent, &reply).await),
            Err(e) => {
                logging::log_error(Some(&request.conversation_id), &e.to_string());
                Err(e)
            }
        }
    }

    /// Leave the open conversation; the next topic pick starts a fresh one.
    pub fn new_conversation(&self, session: &mut ChatSession) {
        logging::log_session(session.conversation_id.as_deref(), "Leaving conversation for topic selection");
        session.reset_to_topic_selection();
    }

    /// Reload settings and recompute the context map.
    pub async fn refresh_settings(&self, session: &mut ChatSession) {
        session.settings = self.load_settings(&session.agent).await;
        session.context = extract_context(session.settings.as_ref());
    }

    async fn load_settings(&self, agent: &Agent) -> Option<Settings> {
        match self.store.get_agent_settings(&agent.id).await {
            Ok(settings) => {
                logging::log_settings(None, &format!(
                    "Loaded settings for {} ({} fields)",
                    agent.id,
                    settings.as_ref().map_or(0, |s| s.values.len())
                ));
                settings
            }
            Err(e) => {
                // degrade to an empty context
                logging::log_error(None, &format!("Settings load failed for {}: {}", agent.id, e));
                None
            }
        }
    }

    fn prepare_request(
        &self,
        session: &mut ChatSession,
        text: &str,
        resolution: ContextResolution,
    ) -> Result<CompletionRequest> {
        let conversation_id = session.conversation_id.clone().ok_or(ChatError::NoConversation)?;

        // the message being answered is the last one in the transcript
        let end = match session.messages.last() {
            Some(m) if m.sender_type == SenderType::User => session.messages.len() - 1,
            _ => session.messages.len(),
        };
        let start = end.saturating_sub(self.history_limit);

        let request = CompletionRequest {
            conversation_id,
            agent: session.agent.clone(),
            history: session.messages[start..end].to_vec(),
            new_message: text.to_string(),
            system_context: session.build_system_context(&self.user_id, resolution),
        };
        session.is_typing = true;
        Ok(request)
    }

    /// Mirror a message to the store; the in-memory copy is kept even if that fails.
    async fn persist(&self, conversation_id: &str, sender_type: SenderType, content: &str) -> Message {
        match self.store.add_message(conversation_id, sender_type, content).await {
            Ok(message) => message,
            Err(e) => {
                logging::log_error(Some(conversation_id), &format!(
                    "Failed to persist {} message: {}", sender_type.as_str(), e
                ));
                Message {
                    id: Uuid::new_v4().to_string(),
                    conversation_id: conversation_id.to_string(),
                    sender_type,
                    content: content.to_string(),
                    timestamp: Utc::now().to_rfc3339(),
                }
            }
        }
    }
}
