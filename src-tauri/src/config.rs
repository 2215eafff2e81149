//! Runtime configuration, read from the environment (and `.env` when present).

use std::path::PathBuf;

use crate::anthropic::CLAUDE_SONNET;
use crate::db::LOCAL_USER_ID;
use crate::error::{ChatError, Result};

const DEFAULT_HISTORY_LIMIT: usize = 20;
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub anthropic_key: Option<String>,
    pub model: String,
    pub db_path: PathBuf,
    pub log_dir: PathBuf,
    pub user_id: String,
    /// Number of prior messages sent along with each request
    pub history_limit: usize,
    pub max_tokens: u32,
}

fn data_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".boardroom")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            anthropic_key: None,
            model: CLAUDE_SONNET.to_string(),
            db_path: data_dir().join("boardroom.db"),
            log_dir: data_dir().join("logs"),
            user_id: LOCAL_USER_ID.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl AppConfig {
    /// Load `.env` (if any) and then read the process environment.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let history_limit = match get("BOARDROOM_HISTORY_LIMIT") {
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                ChatError::config(format!("BOARDROOM_HISTORY_LIMIT must be a number, got '{}'", raw))
            })?,
            None => defaults.history_limit,
        };

        let max_tokens = match get("BOARDROOM_MAX_TOKENS") {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                ChatError::config(format!("BOARDROOM_MAX_TOKENS must be a number, got '{}'", raw))
            })?,
            None => defaults.max_tokens,
        };

        Ok(Self {
            anthropic_key: get("BOARDROOM_ANTHROPIC_KEY").or_else(|| get("ANTHROPIC_API_KEY")),
            model: get("BOARDROOM_MODEL").unwrap_or(defaults.model),
            db_path: get("BOARDROOM_DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            log_dir: get("BOARDROOM_LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
            user_id: get("BOARDROOM_USER_ID").unwrap_or(defaults.user_id),
            history_limit,
            max_tokens,
        })
    }

    pub fn require_anthropic_key(&self) -> Result<&str> {
        self.anthropic_key
            .as_deref()
            .ok_or_else(|| ChatError::config("Anthropic API key not set"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.user_id, "local-user");
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.model, CLAUDE_SONNET);
        assert!(config.anthropic_key.is_none());
        assert!(config.require_anthropic_key().is_err());
    }

    #[test]
    fn test_key_fallback_and_blank_values() {
        let config = AppConfig::from_lookup(lookup(&[
            ("BOARDROOM_ANTHROPIC_KEY", "  "),
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("BOARDROOM_USER_ID", "founder"),
        ]))
        .unwrap();
        assert_eq!(config.require_anthropic_key().unwrap(), "sk-test");
        assert_eq!(config.user_id, "founder");
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let err = AppConfig::from_lookup(lookup(&[("BOARDROOM_HISTORY_LIMIT", "lots")])).unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }
}
