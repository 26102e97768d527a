//! The reasoning stage (tier 3).
//!
//! Runs the injected reasoner under a hard budget and converts its
//! deliberation into a verdict. Failure never escalates severity: on
//! timeout, parse failure or unavailability the stage materializes the
//! tentative verdict carried in from the earlier tiers.

use std::time::Instant;

use tracing::{debug, warn};
use warden_contracts::{method, Action, Escalation, FailureClass, PolicyTable, Verdict};

use crate::{ReasonError, ReasonHints, Reasoner};

/// Tuning knobs of the reasoning stage.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReasonConfig {
    /// Blocks reported below this confidence are downgraded to warnings.
    pub conservative_floor: f64,
    /// Tier-1 fallback blocks below this confidence degrade to allow.
    pub fallback_block_floor: f64,
}

impl Default for ReasonConfig {
    fn default() -> Self {
        Self {
            conservative_floor: 0.70,
            fallback_block_floor: 0.85,
        }
    }
}

/// The reasoning stage.
pub struct ReasonStage {
    config: ReasonConfig,
}

impl ReasonStage {
    pub fn new(config: ReasonConfig) -> Self {
        Self { config }
    }

    /// Asks the reasoner for a deliberation, falling back to the carried
    /// tentative verdict on any failure.
    ///
    /// The returned verdict always satisfies the verdict invariants; in
    /// particular a deliberation with `class = none` is forced to
    /// `allow` regardless of the action the reasoner proposed.
    pub async fn evaluate(
        &self,
        text: &str,
        hints: &ReasonHints,
        policy: &PolicyTable,
        reasoner: &dyn Reasoner,
        deadline: Instant,
    ) -> Verdict {
        let tokio_deadline = tokio::time::Instant::from_std(deadline);
        let result =
            tokio::time::timeout_at(tokio_deadline, reasoner.deliberate(text, hints, deadline))
                .await;

        match result {
            Ok(Ok(deliberation)) => {
                debug!(
                    class = %deliberation.class,
                    confidence = deliberation.confidence,
                    "reasoner deliberated"
                );
                self.from_deliberation(deliberation, policy)
            }
            Ok(Err(ReasonError::Unavailable(reason))) => {
                warn!(reason = %reason, "reasoner unavailable, using tentative verdict");
                self.fallback(&hints.tentative, policy, &format!("reasoner unavailable: {reason}"))
            }
            Ok(Err(ReasonError::Parse(reason))) => {
                warn!(reason = %reason, "reasoner reply unparseable, using tentative verdict");
                self.fallback(&hints.tentative, policy, &format!("unparseable reply: {reason}"))
            }
            Err(_elapsed) => {
                warn!("reasoner missed its deadline, using tentative verdict");
                self.fallback(&hints.tentative, policy, "reasoner missed its deadline")
            }
        }
    }

    /// Maps a successful deliberation into a verdict, applying policy
    /// and the conservative floor.
    fn from_deliberation(
        &self,
        deliberation: crate::Deliberation,
        policy: &PolicyTable,
    ) -> Verdict {
        let confidence = deliberation.confidence.clamp(0.0, 1.0);

        if deliberation.class == FailureClass::None {
            return Verdict::allow(
                3,
                method::REASON,
                confidence,
                deliberation.rationale,
            );
        }

        // Policy decides the action for the class; the reasoner's own
        // proposal only matters through the conservative floor below.
        let mut action = policy.action(deliberation.class);
        let mut explanation = deliberation.rationale;
        if action == Action::Block && confidence < self.config.conservative_floor {
            action = Action::Warn;
            explanation = format!(
                "{explanation} (block downgraded: confidence {confidence:.2} below floor {:.2})",
                self.config.conservative_floor
            );
        }

        Verdict::detection(
            action,
            3,
            method::REASON,
            deliberation.class,
            policy.severity(deliberation.class),
            confidence,
            explanation,
        )
    }

    /// Materializes the tentative signal as the stage's verdict.
    ///
    /// A weak tier-1 block proposal degrades to allow: a sub-0.85
    /// pattern hint is not enough evidence to block on when every
    /// advanced stage has failed.
    fn fallback(&self, tentative: &Escalation, policy: &PolicyTable, why: &str) -> Verdict {
        if tentative.is_silent() {
            return Verdict::allow(
                tentative.tier.clamp(1, 3),
                method::REASON_FALLBACK,
                0.50,
                format!("{why}; no earlier signal"),
            );
        }

        let mut action = tentative.tentative_action;
        if action == Action::Block
            && tentative.tier == 1
            && tentative.confidence < self.config.fallback_block_floor
        {
            action = Action::Allow;
        }

        if action == Action::Allow {
            return Verdict::allow(
                tentative.tier.clamp(1, 3),
                method::REASON_FALLBACK,
                (1.0 - tentative.confidence).max(0.0),
                format!("{why}; weak '{}' signal not enforced", tentative.failure_class),
            );
        }

        Verdict::detection(
            action,
            tentative.tier.clamp(1, 3),
            method::REASON_FALLBACK,
            tentative.failure_class,
            policy.severity(tentative.failure_class),
            tentative.confidence,
            format!("{why}; tentative '{}' enforced", tentative.failure_class),
        )
    }
}

impl Default for ReasonStage {
    fn default() -> Self {
        Self::new(ReasonConfig::default())
    }
}
