//! The injected reasoning interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;
use warden_contracts::{Action, Escalation, FailureClass};

/// Failures of the reasoning backend.
#[derive(Debug, Error)]
pub enum ReasonError {
    /// The backend is not reachable or not configured.
    #[error("reasoner unavailable: {0}")]
    Unavailable(String),

    /// The backend answered but the reply could not be parsed into a
    /// structured deliberation.
    #[error("unparseable reasoner reply: {0}")]
    Parse(String),
}

/// The structured answer requested from the reasoner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deliberation {
    /// The failure class the reasoner settled on (`none` for clean).
    pub class: FailureClass,
    /// The action the reasoner proposes. Policy still has the final word.
    pub action: Action,
    /// Self-reported confidence in `[0, 1]`.
    pub confidence: f64,
    /// Free-text justification, surfaced in the verdict explanation.
    pub rationale: String,
}

/// What the earlier tiers pass down to focus the deliberation.
#[derive(Debug, Clone)]
pub struct ReasonHints {
    /// Classes the earlier tiers considered plausible.
    pub candidates: Vec<FailureClass>,
    /// The tentative signal carried in from tier 1 or 2.
    pub tentative: Escalation,
    /// Request context supplied by the caller (conversation metadata,
    /// source channel, and the like). Opaque to the pipeline.
    pub context: HashMap<String, String>,
}

/// Deliberation backend, injected into the pipeline.
///
/// Contract: implementations must return before `deadline` (with
/// [`ReasonError::Unavailable`] if they cannot finish in time) and must
/// never panic on malformed model output; that is what
/// [`ReasonError::Parse`] is for.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn deliberate(
        &self,
        text: &str,
        hints: &ReasonHints,
        deadline: Instant,
    ) -> Result<Deliberation, ReasonError>;
}

/// A deterministic, rule-table reasoner.
///
/// Answers from a substring → deliberation table; anything unmatched is
/// a clean pass. Used in tests and as a stand-in when no model backend
/// is configured.
#[derive(Debug, Default)]
pub struct ScriptedReasoner {
    rules: Vec<(String, Deliberation)>,
}

impl ScriptedReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule: inputs containing `needle` get `deliberation`.
    pub fn with_rule(mut self, needle: &str, deliberation: Deliberation) -> Self {
        self.rules.push((needle.to_lowercase(), deliberation));
        self
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn deliberate(
        &self,
        text: &str,
        _hints: &ReasonHints,
        _deadline: Instant,
    ) -> Result<Deliberation, ReasonError> {
        let lowered = text.to_lowercase();
        for (needle, deliberation) in &self.rules {
            if lowered.contains(needle) {
                return Ok(deliberation.clone());
            }
        }
        Ok(Deliberation {
            class: FailureClass::None,
            action: Action::Allow,
            confidence: 0.90,
            rationale: "no failure pattern identified".to_string(),
        })
    }
}
