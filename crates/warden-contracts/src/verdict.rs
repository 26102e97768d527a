//! The verdict record produced by every stage and by the pipeline.

use serde::{Deserialize, Serialize};

use crate::{Action, FailureClass, Severity};

/// Well-known values of [`Verdict::method`].
///
/// The method string records *how* a verdict was reached, which is the
/// only way downstream consumers can distinguish a clean classification
/// from a timeout, a skipped stage, or an internal error. The set is
/// closed; stages must not invent ad-hoc strings.
pub mod method {
    /// Empty or whitespace-only input, nothing to inspect.
    pub const GUARD_EMPTY: &str = "guard_empty";
    /// Pathological input: oversized, repetitive or low-diversity.
    pub const GUARD_PATHOLOGICAL: &str = "guard_pathological";
    /// A fixed attack signature matched (SQL, XSS, traversal, shell).
    pub const GUARD_SIGNATURE: &str = "guard_signature";
    /// A high-confidence positive pattern matched.
    pub const PATTERN_STRONG: &str = "pattern_strong";
    /// A high-confidence anti-pattern overrode suspicion.
    pub const PATTERN_ANTIMATCH: &str = "pattern_antimatch";
    /// Short text with no suspicious tokens at all.
    pub const PATTERN_CLEAR: &str = "pattern_clear";
    /// A weak match below the escalation band; finalized at tier 1.
    pub const PATTERN_WEAK: &str = "pattern_weak";
    /// Exemplar similarity crossed a class threshold.
    pub const SEMANTIC: &str = "semantic";
    /// No exemplar class triggered.
    pub const SEMANTIC_CLEAR: &str = "semantic_clear";
    /// The embedding encoder missed its deadline.
    pub const SEMANTIC_TIMEOUT: &str = "semantic_timeout";
    /// The encoder was unavailable; stage skipped.
    pub const SEMANTIC_SKIPPED: &str = "semantic_skipped";
    /// The external reasoner produced the verdict.
    pub const REASON: &str = "reason";
    /// The reasoner failed; the carried tentative verdict was returned.
    pub const REASON_FALLBACK: &str = "reason_fallback";
    /// Total pipeline budget exhausted before any stage terminated.
    pub const BUDGET_EXHAUSTED: &str = "budget_exhausted";
    /// Invariant violation; the request failed closed.
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// The structured result of inspecting one payload.
///
/// Invariants (enforced by the constructors and checked in tests):
///
/// - `tier_used` is 1, 2 or 3
/// - `confidence` is within `[0, 1]`
/// - `failure_class == None` implies `action == Allow`
///
/// `confidence` reflects the stage that produced the verdict, never an
/// aggregate across stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Enforcement outcome.
    pub action: Action,
    /// Which tier terminated the request (1 = patterns, 2 = semantic,
    /// 3 = reasoner). Guard verdicts count as tier 1.
    pub tier_used: u8,
    /// How the verdict was reached; one of the [`method`] constants.
    pub method: String,
    /// Detected failure class, `None` when the payload is clean.
    pub failure_class: FailureClass,
    /// Severity grade from policy.
    pub severity: Severity,
    /// Confidence of the producing stage, in `[0, 1]`.
    pub confidence: f64,
    /// Wall-clock cost of the original computation in milliseconds.
    /// Preserved verbatim when the verdict is served from cache.
    pub processing_time_ms: f64,
    /// Human-readable account of what drove the decision.
    pub explanation: String,
    /// `true` when served from the decision cache.
    pub cache_hit: bool,
}

impl Verdict {
    /// Builds an `allow` verdict with `failure_class = None`.
    pub fn allow(tier: u8, method: &str, confidence: f64, explanation: impl Into<String>) -> Self {
        Self {
            action: Action::Allow,
            tier_used: tier,
            method: method.to_string(),
            failure_class: FailureClass::None,
            severity: Severity::Info,
            confidence: confidence.clamp(0.0, 1.0),
            processing_time_ms: 0.0,
            explanation: explanation.into(),
            cache_hit: false,
        }
    }

    /// Builds a verdict for a detected failure.
    pub fn detection(
        action: Action,
        tier: u8,
        method: &str,
        class: FailureClass,
        severity: Severity,
        confidence: f64,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            action,
            tier_used: tier,
            method: method.to_string(),
            failure_class: class,
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            processing_time_ms: 0.0,
            explanation: explanation.into(),
            cache_hit: false,
        }
    }

    /// Stamps the measured processing time, in milliseconds.
    pub fn timed(mut self, elapsed_ms: f64) -> Self {
        self.processing_time_ms = elapsed_ms;
        self
    }

    pub fn is_blocked(&self) -> bool {
        self.action.is_block()
    }

    pub fn is_allowed(&self) -> bool {
        self.action == Action::Allow
    }

    /// `true` when the verdict upholds the structural invariants of the
    /// verdict contract. Used by debug assertions and tests.
    pub fn is_well_formed(&self) -> bool {
        let tier_ok = (1..=3).contains(&self.tier_used);
        let conf_ok = (0.0..=1.0).contains(&self.confidence);
        let none_ok = self.failure_class != FailureClass::None || self.action == Action::Allow;
        tier_ok && conf_ok && none_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_verdict_is_well_formed() {
        let v = Verdict::allow(1, method::PATTERN_CLEAR, 0.9, "no suspicious tokens");
        assert!(v.is_well_formed());
        assert!(v.is_allowed());
        assert_eq!(v.failure_class, FailureClass::None);
        assert_eq!(v.severity, Severity::Info);
    }

    #[test]
    fn test_detection_clamps_confidence() {
        let v = Verdict::detection(
            Action::Block,
            1,
            method::PATTERN_STRONG,
            FailureClass::PromptInjection,
            Severity::Critical,
            1.7,
            "matched",
        );
        assert!(v.is_well_formed());
        assert!((v.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_none_class_with_block_is_malformed() {
        let mut v = Verdict::allow(1, method::GUARD_EMPTY, 0.5, "");
        v.action = Action::Block;
        assert!(!v.is_well_formed());
    }

    #[test]
    fn test_timed_stamps_duration() {
        let v = Verdict::allow(2, method::SEMANTIC_CLEAR, 0.8, "").timed(12.5);
        assert!((v.processing_time_ms - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_serialization_shape() {
        let v = Verdict::detection(
            Action::Warn,
            2,
            method::SEMANTIC,
            FailureClass::Overconfidence,
            Severity::Medium,
            0.72,
            "similar to overconfidence exemplar",
        );
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["action"], "warn");
        assert_eq!(json["failure_class"], "overconfidence");
        assert_eq!(json["tier_used"], 2);
        assert_eq!(json["cache_hit"], false);
    }
}
