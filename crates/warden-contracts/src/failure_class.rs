//! The closed failure-class taxonomy.
//!
//! Each variant names one pattern of problematic content the pipeline can
//! detect in a prompt or a model response. The enumeration is closed at
//! process start: policy may tune thresholds and actions per class, but it
//! cannot invent new classes at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ParseContractError;

/// All detectable failure patterns.
///
/// The taxonomy covers three families:
///
/// | Family | Variants |
/// |--------|----------|
/// | Prompt-level attacks | `PromptInjection`, `SqlInjection`, `Xss`, `PathTraversal`, `CommandInjection`, `PathologicalInput` |
/// | Content reliability | `FabricatedConcept`, `FabricatedFact`, `MissingGrounding`, `Overconfidence`, `DomainMismatch` |
/// | Content safety | `Bias`, `Toxicity` |
///
/// `None` is the explicit "no failure detected" value; a verdict carrying
/// it always has action `allow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    PromptInjection,
    FabricatedConcept,
    MissingGrounding,
    Overconfidence,
    DomainMismatch,
    FabricatedFact,
    Bias,
    Toxicity,
    SqlInjection,
    Xss,
    PathTraversal,
    CommandInjection,
    PathologicalInput,
    None,
}

impl FailureClass {
    /// Every variant, in declaration order.
    ///
    /// Used to iterate the taxonomy when building default policies and
    /// per-class thresholds.
    pub const ALL: [FailureClass; 14] = [
        FailureClass::PromptInjection,
        FailureClass::FabricatedConcept,
        FailureClass::MissingGrounding,
        FailureClass::Overconfidence,
        FailureClass::DomainMismatch,
        FailureClass::FabricatedFact,
        FailureClass::Bias,
        FailureClass::Toxicity,
        FailureClass::SqlInjection,
        FailureClass::Xss,
        FailureClass::PathTraversal,
        FailureClass::CommandInjection,
        FailureClass::PathologicalInput,
        FailureClass::None,
    ];

    /// The stable wire name of this class (`snake_case`).
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::PromptInjection => "prompt_injection",
            FailureClass::FabricatedConcept => "fabricated_concept",
            FailureClass::MissingGrounding => "missing_grounding",
            FailureClass::Overconfidence => "overconfidence",
            FailureClass::DomainMismatch => "domain_mismatch",
            FailureClass::FabricatedFact => "fabricated_fact",
            FailureClass::Bias => "bias",
            FailureClass::Toxicity => "toxicity",
            FailureClass::SqlInjection => "sql_injection",
            FailureClass::Xss => "xss",
            FailureClass::PathTraversal => "path_traversal",
            FailureClass::CommandInjection => "command_injection",
            FailureClass::PathologicalInput => "pathological_input",
            FailureClass::None => "none",
        }
    }

    /// Returns `true` for the classes describing injection-style attacks
    /// against the surrounding system rather than unreliable content.
    ///
    /// Security classes get the stricter default similarity threshold in
    /// the exemplar index (0.65 vs 0.70).
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            FailureClass::PromptInjection
                | FailureClass::SqlInjection
                | FailureClass::Xss
                | FailureClass::PathTraversal
                | FailureClass::CommandInjection
                | FailureClass::PathologicalInput
        )
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureClass {
    type Err = ParseContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FailureClass::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ParseContractError {
                kind: "failure class",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip() {
        for class in FailureClass::ALL {
            let parsed: FailureClass = class.as_str().parse().unwrap();
            assert_eq!(parsed, class);
        }
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&FailureClass::PromptInjection).unwrap();
        assert_eq!(json, "\"prompt_injection\"");
        let back: FailureClass = serde_json::from_str("\"sql_injection\"").unwrap();
        assert_eq!(back, FailureClass::SqlInjection);
    }

    #[test]
    fn test_unknown_class_rejected() {
        let err = "rug_pull".parse::<FailureClass>().unwrap_err();
        assert!(err.to_string().contains("rug_pull"));
    }

    #[test]
    fn test_security_split() {
        assert!(FailureClass::SqlInjection.is_security());
        assert!(FailureClass::PromptInjection.is_security());
        assert!(!FailureClass::Overconfidence.is_security());
        assert!(!FailureClass::None.is_security());
    }
}
