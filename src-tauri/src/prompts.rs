//! Prompt building
//!
//! Everything here is a pure function of the topic, the assistant and the
//! stored settings, so a conversation always gets the same intro and the same
//! system instruction for the same inputs.

use crate::anthropic::SystemContext;
use crate::assistant::Assistant;
use crate::context::{extract_context, format_context_block};
use crate::db::Agent;
use crate::settings::Settings;
use crate::topics::Topic;

/// Appended whenever the user declined (or had nothing) to share.
pub const MANUAL_MODE_INSTRUCTION: &str = "MANUAL MODE: You do not have access to any stored information about the user or their business. Do not reference saved profile data or pretend to know details you were not told in this conversation. When you need a fact (numbers, team, audience, stage), ask the user for it directly, one or two questions at a time.";

const RESPONSE_RULES: &str = "IMPORTANT: Never prefix your response with your name, labels, or tags. Just respond directly. Be concrete and practical: prefer numbers, owners and next steps over generic advice. Keep answers focused; use short lists when they help. Don't use emojis. Don't be sycophantic.";

fn persona_prompt(assistant: Assistant) -> &'static str {
    match assistant {
        Assistant::SecondBrain => r#"You are the user's Second Brain. You represent:
- Capturing and organizing ideas
- Clarifying priorities
- Turning thinking into decisions and next actions

Your voice is: calm, structured, curious. You reflect the user's thoughts back in a clearer shape and ask the one question that moves them forward."#,

        Assistant::Cmo => r#"You are the user's CMO (Chief Marketing Officer). You represent:
- Positioning and messaging
- Demand generation and growth
- Brand and audience understanding

Your voice is: energetic, customer-obsessed, commercially minded. You tie every idea back to a customer and a measurable result."#,

        Assistant::Cfo => r#"You are the user's CFO (Chief Financial Officer). You represent:
- Cash management and runway
- Financial planning and unit economics
- Fundraising and capital allocation

Your voice is: precise, prudent, numbers-first. You make trade-offs explicit and flag risks early."#,

        Assistant::Coo => r#"You are the user's COO (Chief Operating Officer). You represent:
- Execution and operational excellence
- Processes, tooling and accountability
- Team structure and hiring

Your voice is: pragmatic, organized, direct. You turn plans into owners, deadlines and systems."#,
    }
}

/// Greeting posted by the assistant as the first message of a new conversation.
///
/// Only the company name is picked up from settings; the rest of the stored
/// profile stays behind the consent gate.
pub fn build_intro_message(topic: &Topic, assistant: Assistant, settings: Option<&Settings>) -> String {
    let company = settings.and_then(|s| s.get("company"));
    let scope = match company {
        Some(company) => format!(" for {}", company),
        None => String::new(),
    };
    format!(
        "Hi, I'm your {}. Let's dig into {}{} together. To get started, tell me where things stand today and what you'd like to get out of this conversation.",
        assistant.display_name(),
        topic.label.to_lowercase(),
        scope
    )
}

/// System instruction stored once per conversation and sent with every exchange.
pub fn build_topic_prompt(topic: &Topic, assistant: Assistant, settings: Option<&Settings>) -> String {
    let mut parts = vec![
        format!(
            "You are acting as {}. This conversation is about: {}.",
            assistant.role_description(),
            topic.label
        ),
        format!("TOPIC GUIDANCE:\n{}", topic.prompt_template),
    ];

    let context = extract_context(settings);
    if !context.is_empty() {
        let available: Vec<&str> = context.values().map(|f| f.label.as_str()).collect();
        parts.push(format!(
            "The user keeps a profile with: {}. Use it only when it is attached to a request.",
            available.join(", ")
        ));
    }

    parts.join("\n\n")
}

/// Full system prompt for one completion call.
pub fn compose_system_prompt(agent: &Agent, system_context: &SystemContext) -> String {
    let mut sections = vec![persona_prompt(agent.assistant).to_string()];

    if let Some(instruction) = system_context
        .system_instruction
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        sections.push(instruction.to_string());
    }

    let context_block = if system_context.permission_granted {
        format_context_block(&system_context.available_context)
    } else {
        None
    };

    match context_block {
        Some(block) => {
            let source_note = if system_context.use_admin_settings {
                "\nThese details were configured by an administrator for this workspace."
            } else {
                ""
            };
            sections.push(format!(
                "--- User Context ---\n{}{}\n---\nThe user agreed to share this. Use it naturally where relevant.",
                block, source_note
            ));
        }
        None if system_context.manual_mode => sections.push(MANUAL_MODE_INSTRUCTION.to_string()),
        None => {}
    }

    if let Some(custom) = system_context
        .custom_instructions
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        sections.push(format!("--- Custom Instructions ---\n{}\n---", custom));
    }

    sections.push(RESPONSE_RULES.to_string());
    sections.join("\n\n")
}
