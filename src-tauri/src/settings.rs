use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a settings record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsSource {
    #[default]
    User,
    Admin,
}

impl SettingsSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingsSource::User => "user",
            SettingsSource::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> SettingsSource {
        match s {
            "admin" => SettingsSource::Admin,
            _ => SettingsSource::User,
        }
    }
}

/// Per-user, per-assistant profile fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Settings {
    pub agent_id: String,
    pub values: BTreeMap<String, String>,
    pub custom_instructions: Option<String>,
    pub source: SettingsSource,
    pub updated_at: String,
}

impl Settings {
    pub fn new(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            updated_at: Utc::now().to_rfc3339(),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Custom instructions, if set to something other than whitespace.
    pub fn custom_instructions(&self) -> Option<&str> {
        self.custom_instructions
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
