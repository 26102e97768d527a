//! Stage outcome types.
//!
//! Every tier implements the same capability: evaluate a text under a
//! deadline and either terminate with a [`Verdict`] or hand the router an
//! [`Escalation`] describing its best (insufficient) signal. The router is
//! polymorphic over this shape, which keeps tiers independently testable
//! and swappable.

use serde::{Deserialize, Serialize};

use crate::{Action, FailureClass, Verdict};

/// What a stage hands back to the router.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// The stage is certain enough to terminate the request.
    Terminal(Verdict),
    /// The stage's signal is too weak to terminate; the router may run
    /// the next tier, carrying this tentative result forward.
    Escalate(Escalation),
}

impl StageOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageOutcome::Terminal(_))
    }
}

/// A tentative, non-terminating signal carried between tiers.
///
/// When a later tier fails (timeout, dependency unavailable) the router
/// falls back to this signal rather than fabricating a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    /// Best-matching class so far, `None` when nothing matched.
    pub failure_class: FailureClass,
    /// Confidence of the best match, 0.0 when nothing matched.
    pub confidence: f64,
    /// The action policy would take for this class at this confidence.
    pub tentative_action: Action,
    /// Method string of the stage that produced the signal.
    pub method: String,
    /// Tier that produced the signal.
    pub tier: u8,
}

impl Escalation {
    /// An escalation carrying no signal at all (nothing matched).
    pub fn empty(tier: u8, method: &str) -> Self {
        Self {
            failure_class: FailureClass::None,
            confidence: 0.0,
            tentative_action: Action::Allow,
            method: method.to_string(),
            tier,
        }
    }

    /// `true` when the stage saw no match whatsoever.
    pub fn is_silent(&self) -> bool {
        self.failure_class == FailureClass::None && self.confidence == 0.0
    }
}
