//! Error types for the core crate.
//!
//! Note the narrow surface: most failure modes of the pipeline are not
//! errors at all but verdicts (`internal_error`, `budget_exhausted`,
//! `semantic_timeout`). The variants here cover construction, reload and
//! batch validation, where a structured error is the right answer.

use thiserror::Error;

/// Errors of pipeline construction and operation.
#[derive(Debug, Error)]
pub enum WardenError {
    /// The policy document could not be parsed. The previous snapshot
    /// stays in force.
    #[error("policy parse error: {0}")]
    PolicyParse(#[from] serde_yaml::Error),

    /// A pattern in the policy failed validation or compilation.
    #[error(transparent)]
    Pattern(#[from] warden_screen::ScreenError),

    /// Exemplar index construction failed (dimension mismatch).
    #[error(transparent)]
    Semantic(#[from] warden_semantic::SemanticError),

    /// The embedder failed while encoding exemplars for a new snapshot.
    #[error("exemplar encoding failed: {0}")]
    ExemplarEncoding(String),

    /// A batch exceeded the configured size bound.
    #[error("batch of {got} requests exceeds the limit of {limit}")]
    BatchTooLarge {
        /// Requests submitted.
        got: usize,
        /// Configured bound.
        limit: usize,
    },

    /// Metric registration failed at construction.
    #[error("metrics init failed: {0}")]
    Metrics(String),
}
