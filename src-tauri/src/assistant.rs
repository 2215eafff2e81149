use serde::{Deserialize, Serialize};

use crate::topics::{self, Topic};

/// The fixed set of role personas a user can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Assistant {
    SecondBrain,
    Cmo,
    Cfo,
    Coo,
}

/// A known settings field and the label it is shown under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsField {
    pub key: &'static str,
    pub label: &'static str,
}

const SECOND_BRAIN_FIELDS: &[SettingsField] = &[
    SettingsField { key: "name", label: "Name" },
    SettingsField { key: "role", label: "Role" },
    SettingsField { key: "company", label: "Company" },
    SettingsField { key: "goals", label: "Current Goals" },
    SettingsField { key: "working_style", label: "Working Style" },
];

const CMO_FIELDS: &[SettingsField] = &[
    SettingsField { key: "company", label: "Company" },
    SettingsField { key: "industry", label: "Industry" },
    SettingsField { key: "target_audience", label: "Target Audience" },
    SettingsField { key: "brand_voice", label: "Brand Voice" },
    SettingsField { key: "channels", label: "Marketing Channels" },
    SettingsField { key: "marketing_budget", label: "Marketing Budget" },
];

const CFO_FIELDS: &[SettingsField] = &[
    SettingsField { key: "company", label: "Company" },
    SettingsField { key: "funding", label: "Funding Stage" },
    SettingsField { key: "revenue", label: "Annual Revenue" },
    SettingsField { key: "burn_rate", label: "Monthly Burn Rate" },
    SettingsField { key: "runway", label: "Runway" },
    SettingsField { key: "currency", label: "Reporting Currency" },
];

const COO_FIELDS: &[SettingsField] = &[
    SettingsField { key: "company", label: "Company" },
    SettingsField { key: "team_size", label: "Team Size" },
    SettingsField { key: "tools", label: "Operational Tools" },
    SettingsField { key: "processes", label: "Key Processes" },
    SettingsField { key: "bottlenecks", label: "Known Bottlenecks" },
];

impl Assistant {
    pub const ALL: [Assistant; 4] = [
        Assistant::SecondBrain,
        Assistant::Cmo,
        Assistant::Cfo,
        Assistant::Coo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Assistant::SecondBrain => "second-brain",
            Assistant::Cmo => "cmo",
            Assistant::Cfo => "cfo",
            Assistant::Coo => "coo",
        }
    }

    /// Accepts the stable id as well as the spellings older clients sent.
    pub fn from_str(s: &str) -> Option<Assistant> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "second-brain" | "secondbrain" => Some(Assistant::SecondBrain),
            "cmo" => Some(Assistant::Cmo),
            "cfo" => Some(Assistant::Cfo),
            "coo" => Some(Assistant::Coo),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Assistant::SecondBrain => "Second Brain",
            Assistant::Cmo => "CMO",
            Assistant::Cfo => "CFO",
            Assistant::Coo => "COO",
        }
    }

    pub fn role_description(&self) -> &'static str {
        match self {
            Assistant::SecondBrain => "a thinking partner who helps organize ideas, priorities and decisions",
            Assistant::Cmo => "a Chief Marketing Officer focused on positioning, growth and brand",
            Assistant::Cfo => "a Chief Financial Officer focused on cash, planning and financial health",
            Assistant::Coo => "a Chief Operating Officer focused on execution, processes and teams",
        }
    }

    /// Accent colour used by the chat UI.
    pub fn brand_color(&self) -> &'static str {
        match self {
            Assistant::SecondBrain => "#7C6FE0",
            Assistant::Cmo => "#E07A5F",
            Assistant::Cfo => "#3D9970",
            Assistant::Coo => "#6BB8C9",
        }
    }

    pub fn topics(&self) -> &'static [Topic] {
        match self {
            Assistant::SecondBrain => topics::SECOND_BRAIN_TOPICS,
            Assistant::Cmo => topics::CMO_TOPICS,
            Assistant::Cfo => topics::CFO_TOPICS,
            Assistant::Coo => topics::COO_TOPICS,
        }
    }

    pub fn find_topic(&self, topic_id: &str) -> Option<&'static Topic> {
        self.topics().iter().find(|t| t.id == topic_id)
    }

    /// Table holding this assistant's settings rows.
    pub fn settings_table(&self) -> &'static str {
        match self {
            Assistant::SecondBrain => "second_brain_settings",
            Assistant::Cmo => "cmo_settings",
            Assistant::Cfo => "cfo_settings",
            Assistant::Coo => "coo_settings",
        }
    }

    pub fn settings_fields(&self) -> &'static [SettingsField] {
        match self {
            Assistant::SecondBrain => SECOND_BRAIN_FIELDS,
            Assistant::Cmo => CMO_FIELDS,
            Assistant::Cfo => CFO_FIELDS,
            Assistant::Coo => COO_FIELDS,
        }
    }

    pub fn field_label(&self, key: &str) -> Option<&'static str> {
        self.settings_fields()
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.label)
    }
}

impl std::fmt::Display for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trip() {
        for assistant in Assistant::ALL {
            assert_eq!(Assistant::from_str(assistant.as_str()), Some(assistant));
        }
    }

    #[test]
    fn test_legacy_spellings() {
        assert_eq!(Assistant::from_str("second_brain"), Some(Assistant::SecondBrain));
        assert_eq!(Assistant::from_str(" CFO "), Some(Assistant::Cfo));
        assert_eq!(Assistant::from_str("cto"), None);
    }

    #[test]
    fn test_every_assistant_has_topics_and_fields() {
        for assistant in Assistant::ALL {
            assert!(!assistant.topics().is_empty(), "{} has no topics", assistant);
            assert!(!assistant.settings_fields().is_empty());
        }
    }

    #[test]
    fn test_settings_tables_are_distinct() {
        let mut tables: Vec<_> = Assistant::ALL.iter().map(|a| a.settings_table()).collect();
        tables.sort();
        tables.dedup();
        assert_eq!(tables.len(), Assistant::ALL.len());
    }

    #[test]
    fn test_brand_colors_are_hex() {
        for assistant in Assistant::ALL {
            let color = assistant.brand_color();
            assert!(color.starts_with('#') && color.len() == 7, "{}: {}", assistant, color);
        }
    }

    #[test]
    fn test_serde_uses_kebab_ids() {
        let json = serde_json::to_string(&Assistant::SecondBrain).unwrap();
        assert_eq!(json, "\"second-brain\"");
    }
}
