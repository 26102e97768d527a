//! # Warden Contracts
//!
//! Shared vocabulary for the Warden inspection pipeline: the closed
//! failure-class taxonomy, severity and action enumerations, the
//! [`Verdict`] record every stage produces, and the declarative policy
//! table that maps failure classes to enforcement outcomes.
//!
//! Every other `warden-*` crate depends on this one and nothing else in
//! the workspace, so the stage crates stay independently testable.

mod failure_class;
mod outcome;
mod policy;
mod severity;
mod verdict;

pub use failure_class::FailureClass;
pub use outcome::{Escalation, StageOutcome};
pub use policy::{ClassPolicy, PolicyTable};
pub use severity::{Action, Severity};
pub use verdict::{method, Verdict};

/// Error raised when parsing a contract enum from its wire form.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseContractError {
    /// Which enumeration failed to parse (`"failure class"`, `"action"`, ...).
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}
