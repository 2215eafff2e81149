//! Context extraction
//!
//! Turns a stored settings record into the named context fields that may be
//! injected into the model prompt once the user allows it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::assistant::Assistant;
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextField {
    pub label: String,
    pub value: String,
}

/// Field name -> context field, ordered by field name.
pub type ContextMap = BTreeMap<String, ContextField>;

/// Extract every non-empty settings value.
///
/// Absent settings give an empty map. Labels come from the assistant's field
/// schema when the record belongs to a known assistant; other keys are
/// humanized.
pub fn extract_context(settings: Option<&Settings>) -> ContextMap {
    let Some(settings) = settings else {
        return ContextMap::new();
    };

    let assistant = Assistant::from_str(&settings.agent_id);

    settings
        .values
        .iter()
        .filter_map(|(key, value)| {
            let value = value.trim();
            if value.is_empty() {
                return None;
            }
            let label = assistant
                .and_then(|a| a.field_label(key))
                .map(str::to_string)
                .unwrap_or_else(|| humanize_key(key));
            Some((
                key.clone(),
                ContextField {
                    label,
                    value: value.to_string(),
                },
            ))
        })
        .collect()
}

/// `funding_stage` -> `Funding Stage`
pub fn humanize_key(key: &str) -> String {
    key.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render the context map as a prompt block, or `None` when there is nothing to share.
pub fn format_context_block(context: &ContextMap) -> Option<String> {
    if context.is_empty() {
        return None;
    }
    let lines: Vec<String> = context
        .values()
        .map(|field| format!("- {}: {}", field.label, field.value))
        .collect();
    Some(format!("WHAT THE USER HAS SHARED ABOUT THEIR BUSINESS:\n{}", lines.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_settings_yield_empty_map() {
        assert!(extract_context(None).is_empty());
    }

    #[test]
    fn test_empty_values_are_omitted() {
        let settings = Settings::new("cfo")
            .with_value("funding", "bootstrapped")
            .with_value("revenue", "")
            .with_value("runway", "  ")
            .with_value("burn_rate", "40k/month");

        let context = extract_context(Some(&settings));

        let keys: Vec<_> = context.keys().cloned().collect();
        assert_eq!(keys, vec!["burn_rate".to_string(), "funding".to_string()]);
        assert_eq!(context["funding"].label, "Funding Stage");
        assert_eq!(context["funding"].value, "bootstrapped");
        assert_eq!(context["burn_rate"].value, "40k/month");
    }

    #[test]
    fn test_settings_with_only_blank_values_is_empty() {
        let settings = Settings::new("coo").with_value("team_size", " ");
        assert!(extract_context(Some(&settings)).is_empty());
    }

    #[test]
    fn test_unknown_keys_are_humanized() {
        let settings = Settings::new("cmo").with_value("north_star_metric", "weekly actives");
        let context = extract_context(Some(&settings));
        assert_eq!(context["north_star_metric"].label, "North Star Metric");
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let settings = Settings::new("cmo")
            .with_value("industry", "fintech")
            .with_value("company", "Acme");
        assert_eq!(extract_context(Some(&settings)), extract_context(Some(&settings)));
    }

    #[test]
    fn test_format_context_block() {
        assert_eq!(format_context_block(&ContextMap::new()), None);

        let settings = Settings::new("cfo").with_value("funding", "bootstrapped");
        let block = format_context_block(&extract_context(Some(&settings))).unwrap();
        assert!(block.contains("- Funding Stage: bootstrapped"));
    }
}
