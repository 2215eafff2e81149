//! Navigation paths for the chat view.
//!
//! `/agent-chat/:agentId?conversationId=..` opens an assistant, optionally
//! resuming a conversation. Anything without an assistant id redirects to
//! `/not-found`.

use percent_encoding::percent_decode_str;
use serde::Serialize;
use url::Url;

pub const NOT_FOUND_PATH: &str = "/not-found";

const AGENT_CHAT_SEGMENT: &str = "agent-chat";
const CONVERSATION_PARAM: &str = "conversationId";
const BASE: &str = "app://boardroom/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum Route {
    AgentChat {
        agent_id: String,
        conversation_id: Option<String>,
    },
    NotFound,
}

impl Route {
    pub fn parse(path: &str) -> Route {
        let Ok(base) = Url::parse(BASE) else {
            return Route::NotFound;
        };
        let Ok(url) = base.join(path.trim()) else {
            return Route::NotFound;
        };

        let segments: Vec<&str> = match url.path_segments() {
            Some(segments) => segments.filter(|s| !s.is_empty()).collect(),
            None => return Route::NotFound,
        };

        match segments.as_slice() {
            [AGENT_CHAT_SEGMENT, raw_agent_id] => {
                // segments come back percent-encoded
                let Ok(agent_id) = percent_decode_str(raw_agent_id).decode_utf8() else {
                    return Route::NotFound;
                };
                if agent_id.trim().is_empty() {
                    return Route::NotFound;
                }

                let conversation_id = url
                    .query_pairs()
                    .find(|(key, _)| key == CONVERSATION_PARAM)
                    .map(|(_, value)| value.trim().to_string())
                    .filter(|value| !value.is_empty());

                Route::AgentChat {
                    agent_id: agent_id.to_string(),
                    conversation_id,
                }
            }
            _ => Route::NotFound,
        }
    }

    /// Path to navigate to for this route.
    pub fn to_path(&self) -> String {
        match self {
            Route::NotFound => NOT_FOUND_PATH.to_string(),
            Route::AgentChat {
                agent_id,
                conversation_id,
            } => {
                let Ok(mut url) = Url::parse(BASE) else {
                    return NOT_FOUND_PATH.to_string();
                };
                if let Ok(mut segments) = url.path_segments_mut() {
                    segments.clear().push(AGENT_CHAT_SEGMENT).push(agent_id);
                }
                if let Some(id) = conversation_id {
                    url.query_pairs_mut().append_pair(CONVERSATION_PARAM, id);
                }
                match url.query() {
                    Some(query) => format!("{}?{}", url.path(), query),
                    None => url.path().to_string(),
                }
            }
        }
    }
}
