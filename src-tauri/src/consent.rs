//! One-time, per-conversation consent gate for stored profile data.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentState {
    #[default]
    Unasked,
    Granted,
    Denied,
}

/// What the outgoing request carries for a given send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextResolution {
    /// User allowed stored context
    Granted,
    /// User declined; the assistant must ask for what it needs
    Denied,
    /// Nothing stored, so nothing to ask about
    Bypassed,
}

impl ContextResolution {
    pub fn permission_granted(&self) -> bool {
        matches!(self, ContextResolution::Granted)
    }

    pub fn manual_mode(&self) -> bool {
        !self.permission_granted()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub content: String,
    pub submitted_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Proceed(ContextResolution),
    AwaitConsent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsentGate {
    state: ConsentState,
    pending: Option<PendingMessage>,
}

impl ConsentGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConsentState {
        self.state
    }

    pub fn pending(&self) -> Option<&PendingMessage> {
        self.pending.as_ref()
    }

    pub fn is_awaiting(&self) -> bool {
        self.pending.is_some()
    }

    /// Route a freshly submitted message through the gate.
    ///
    /// With an empty context the gate is skipped and the state is left
    /// untouched, so a later settings load can still ask.
    pub fn submit(&mut self, content: &str, context_available: bool) -> Result<GateDecision> {
        if self.pending.is_some() {
            return Err(ChatError::ConsentPending);
        }

        match self.state {
            ConsentState::Granted => Ok(GateDecision::Proceed(ContextResolution::Granted)),
            ConsentState::Denied => Ok(GateDecision::Proceed(ContextResolution::Denied)),
            ConsentState::Unasked if !context_available => {
                Ok(GateDecision::Proceed(ContextResolution::Bypassed))
            }
            ConsentState::Unasked => {
                self.pending = Some(PendingMessage {
                    content: content.to_string(),
                    submitted_at: Utc::now().to_rfc3339(),
                });
                Ok(GateDecision::AwaitConsent)
            }
        }
    }

    /// Record the user's choice and hand back the message to reprocess.
    pub fn resolve(&mut self, granted: bool) -> Result<(PendingMessage, ContextResolution)> {
        let pending = self.pending.take().ok_or(ChatError::NoPendingMessage)?;
        let resolution = if granted {
            self.state = ConsentState::Granted;
            ContextResolution::Granted
        } else {
            self.state = ConsentState::Denied;
            ContextResolution::Denied
        };
        Ok((pending, resolution))
    }

    pub fn reset(&mut self) {
        self.state = ConsentState::Unasked;
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bypassed_without_context() {
        let mut gate = ConsentGate::new();
        for _ in 0..3 {
            let decision = gate.submit("hello", false).unwrap();
            assert_eq!(decision, GateDecision::Proceed(ContextResolution::Bypassed));
        }
        assert_eq!(gate.state(), ConsentState::Unasked);
        assert!(!gate.is_awaiting());
    }

    #[test]
    fn test_first_send_with_context_awaits() {
        let mut gate = ConsentGate::new();
        assert_eq!(gate.submit("hello", true).unwrap(), GateDecision::AwaitConsent);
        assert_eq!(gate.pending().map(|p| p.content.as_str()), Some("hello"));
    }

    #[test]
    fn test_second_submit_while_pending_is_rejected() {
        let mut gate = ConsentGate::new();
        gate.submit("first", true).unwrap();
        assert_eq!(gate.submit("second", true), Err(ChatError::ConsentPending));
        assert_eq!(gate.pending().unwrap().content, "first");
    }

    #[test]
    fn test_grant_is_sticky() {
        let mut gate = ConsentGate::new();
        gate.submit("hello", true).unwrap();
        let (pending, resolution) = gate.resolve(true).unwrap();
        assert_eq!(pending.content, "hello");
        assert_eq!(resolution, ContextResolution::Granted);
        assert_eq!(gate.state(), ConsentState::Granted);

        assert_eq!(
            gate.submit("again", true).unwrap(),
            GateDecision::Proceed(ContextResolution::Granted)
        );
    }

    #[test]
    fn test_deny_is_sticky_and_manual() {
        let mut gate = ConsentGate::new();
        gate.submit("hello", true).unwrap();
        let (_, resolution) = gate.resolve(false).unwrap();
        assert!(resolution.manual_mode());
        assert!(!resolution.permission_granted());

        assert_eq!(
            gate.submit("again", true).unwrap(),
            GateDecision::Proceed(ContextResolution::Denied)
        );
    }

    #[test]
    fn test_resolve_without_pending_fails() {
        let mut gate = ConsentGate::new();
        assert_eq!(gate.resolve(true), Err(ChatError::NoPendingMessage));
        assert_eq!(gate.state(), ConsentState::Unasked);
    }

    #[test]
    fn test_reset_returns_to_unasked() {
        let mut gate = ConsentGate::new();
        gate.submit("hello", true).unwrap();
        gate.resolve(true).unwrap();
        gate.reset();
        assert_eq!(gate.state(), ConsentState::Unasked);
        assert_eq!(gate.submit("hi", true).unwrap(), GateDecision::AwaitConsent);
    }
}
