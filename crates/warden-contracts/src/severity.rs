//! Severity grades and enforcement actions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ParseContractError;

/// Severity grade attached to a detected failure.
///
/// Ordering is by urgency: `Critical` ranks above `High`, which ranks
/// above `Medium`, and so on. When several classes trigger at once the
/// pipeline keeps the most severe one, so the derived `Ord` here is
/// load-bearing (declaration order is most-severe first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// `true` when `self` is at least as urgent as `other`.
    pub fn at_least(&self, other: Severity) -> bool {
        self <= &other
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        };
        f.write_str(s)
    }
}

/// The enforcement action a verdict carries.
///
/// - `Block`: reject the payload before it reaches its consumer
/// - `Warn`: deliver, but attach a warning for the consumer
/// - `Allow`: deliver unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Block,
    Warn,
    Allow,
}

impl Action {
    pub fn is_block(&self) -> bool {
        matches!(self, Action::Block)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Block => "block",
            Action::Warn => "warn",
            Action::Allow => "allow",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = ParseContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block" => Ok(Action::Block),
            "warn" => Ok(Action::Warn),
            "allow" => Ok(Action::Allow),
            other => Err(ParseContractError {
                kind: "action",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering_most_urgent_first() {
        assert!(Severity::Critical < Severity::High);
        assert!(Severity::High < Severity::Medium);
        assert!(Severity::Medium < Severity::Low);
        assert!(Severity::Low < Severity::Info);
    }

    #[test]
    fn test_severity_at_least() {
        assert!(Severity::Critical.at_least(Severity::High));
        assert!(Severity::High.at_least(Severity::High));
        assert!(!Severity::Low.at_least(Severity::Medium));
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("block".parse::<Action>().unwrap(), Action::Block);
        assert!("fallback".parse::<Action>().is_err());
    }

    #[test]
    fn test_action_serde() {
        assert_eq!(serde_json::to_string(&Action::Warn).unwrap(), "\"warn\"");
    }
}
