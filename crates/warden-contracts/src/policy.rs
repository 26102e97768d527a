//! The declarative class → enforcement mapping.
//!
//! Policy maps each failure class to a severity, an action, an optional
//! similarity-threshold override and a reason string. There are no
//! class-to-class dependencies; severity-based tie-breaking between
//! simultaneously matching classes is the only inter-class relation and
//! is a pure lookup on this table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Action, FailureClass, Severity};

/// Default similarity threshold for security classes.
pub const SECURITY_THRESHOLD: f64 = 0.65;
/// Default similarity threshold for content classes.
pub const CONTENT_THRESHOLD: f64 = 0.70;

/// Enforcement settings for one failure class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPolicy {
    pub severity: Severity,
    pub action: Action,
    /// Overrides the family default similarity threshold when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// Operator-facing justification, surfaced in verdict explanations.
    #[serde(default)]
    pub reason: String,
}

impl ClassPolicy {
    fn new(severity: Severity, action: Action, reason: &str) -> Self {
        Self {
            severity,
            action,
            threshold: None,
            reason: reason.to_string(),
        }
    }
}

/// The full class → [`ClassPolicy`] mapping.
///
/// A `BTreeMap` keeps iteration deterministic, which the tie-breaking
/// rules of the semantic stage rely on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyTable {
    classes: BTreeMap<FailureClass, ClassPolicy>,
}

impl Default for PolicyTable {
    /// The built-in defaults:
    ///
    /// | Class | Severity | Action |
    /// |-------|----------|--------|
    /// | prompt_injection, toxicity, path_traversal, command_injection | critical | block |
    /// | fabricated_fact, fabricated_concept, sql_injection, xss, bias | high | block |
    /// | missing_grounding, overconfidence | medium | warn |
    /// | domain_mismatch | low | warn |
    /// | pathological_input | high | block |
    /// | none | info | allow |
    fn default() -> Self {
        use Action::*;
        use FailureClass as F;
        use Severity::*;

        let mut classes = BTreeMap::new();
        classes.insert(
            F::PromptInjection,
            ClassPolicy::new(Critical, Block, "attempt to override system instructions"),
        );
        classes.insert(
            F::Toxicity,
            ClassPolicy::new(Critical, Block, "harmful or abusive content"),
        );
        classes.insert(
            F::PathTraversal,
            ClassPolicy::new(Critical, Block, "filesystem traversal attempt"),
        );
        classes.insert(
            F::CommandInjection,
            ClassPolicy::new(Critical, Block, "shell command injection attempt"),
        );
        classes.insert(
            F::FabricatedFact,
            ClassPolicy::new(High, Block, "verifiably false statement asserted as fact"),
        );
        classes.insert(
            F::FabricatedConcept,
            ClassPolicy::new(High, Block, "invented term or concept presented as real"),
        );
        classes.insert(
            F::SqlInjection,
            ClassPolicy::new(High, Block, "SQL injection payload"),
        );
        classes.insert(F::Xss, ClassPolicy::new(High, Block, "script injection payload"));
        classes.insert(
            F::Bias,
            ClassPolicy::new(High, Block, "biased or discriminatory framing"),
        );
        classes.insert(
            F::MissingGrounding,
            ClassPolicy::new(Medium, Warn, "claims lack citations or grounding"),
        );
        classes.insert(
            F::Overconfidence,
            ClassPolicy::new(Medium, Warn, "certainty not supported by evidence"),
        );
        classes.insert(
            F::DomainMismatch,
            ClassPolicy::new(Low, Warn, "response addresses the wrong domain"),
        );
        classes.insert(
            F::PathologicalInput,
            ClassPolicy::new(High, Block, "input crafted to waste matcher or encoder time"),
        );
        classes.insert(F::None, ClassPolicy::new(Info, Allow, "no failure detected"));

        Self { classes }
    }
}

impl PolicyTable {
    /// Looks up the policy for a class.
    ///
    /// The table always contains every variant of the closed enumeration,
    /// so a miss here is a construction bug; callers get the `None`-class
    /// policy as a safe fallback rather than a panic.
    pub fn class(&self, class: FailureClass) -> &ClassPolicy {
        self.classes
            .get(&class)
            .unwrap_or_else(|| &self.classes[&FailureClass::None])
    }

    /// Severity of a class under this policy.
    pub fn severity(&self, class: FailureClass) -> Severity {
        self.class(class).severity
    }

    /// Action for a class under this policy. Policy has the final word:
    /// stages propose actions, this lookup decides them.
    pub fn action(&self, class: FailureClass) -> Action {
        self.class(class).action
    }

    /// Effective similarity threshold for a class: the per-class override
    /// when present, else the family default.
    pub fn threshold(&self, class: FailureClass) -> f64 {
        self.class(class).threshold.unwrap_or(if class.is_security() {
            SECURITY_THRESHOLD
        } else {
            CONTENT_THRESHOLD
        })
    }

    /// Replaces the settings for one class. Unknown classes cannot exist:
    /// the enumeration is closed, so this is total.
    pub fn set(&mut self, class: FailureClass, policy: ClassPolicy) {
        self.classes.insert(class, policy);
    }

    /// Iterates classes in deterministic (enum) order.
    pub fn iter(&self) -> impl Iterator<Item = (FailureClass, &ClassPolicy)> {
        self.classes.iter().map(|(c, p)| (*c, p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_enforcement_table() {
        let table = PolicyTable::default();
        assert_eq!(table.action(FailureClass::PromptInjection), Action::Block);
        assert_eq!(table.severity(FailureClass::PromptInjection), Severity::Critical);
        assert_eq!(table.action(FailureClass::Overconfidence), Action::Warn);
        assert_eq!(table.severity(FailureClass::Overconfidence), Severity::Medium);
        assert_eq!(table.action(FailureClass::DomainMismatch), Action::Warn);
        assert_eq!(table.severity(FailureClass::DomainMismatch), Severity::Low);
        assert_eq!(table.action(FailureClass::PathologicalInput), Action::Block);
        assert_eq!(table.action(FailureClass::None), Action::Allow);
        assert_eq!(table.severity(FailureClass::None), Severity::Info);
    }

    #[test]
    fn test_threshold_families() {
        let table = PolicyTable::default();
        assert!((table.threshold(FailureClass::SqlInjection) - SECURITY_THRESHOLD).abs() < 1e-9);
        assert!((table.threshold(FailureClass::Bias) - CONTENT_THRESHOLD).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_override_wins() {
        let mut table = PolicyTable::default();
        let mut policy = table.class(FailureClass::Toxicity).clone();
        policy.threshold = Some(0.55);
        table.set(FailureClass::Toxicity, policy);
        assert!((table.threshold(FailureClass::Toxicity) - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_action_override_changes_lookup() {
        let mut table = PolicyTable::default();
        let mut policy = table.class(FailureClass::Overconfidence).clone();
        policy.action = Action::Block;
        table.set(FailureClass::Overconfidence, policy);
        assert_eq!(table.action(FailureClass::Overconfidence), Action::Block);
    }

    #[test]
    fn test_every_class_present() {
        let table = PolicyTable::default();
        for class in FailureClass::ALL {
            // Must not fall back to the None policy for real classes.
            if class != FailureClass::None {
                assert_ne!(table.class(class).reason, table.class(FailureClass::None).reason);
            }
        }
    }

    #[test]
    fn test_table_serde_round_trip() {
        let table = PolicyTable::default();
        let yaml_like = serde_json::to_string(&table).unwrap();
        let back: PolicyTable = serde_json::from_str(&yaml_like).unwrap();
        assert_eq!(back, table);
    }
}
