//! Error types for the screen crate.

use thiserror::Error;

/// Errors raised while loading the pattern library.
///
/// All of these are load-time errors: once a [`crate::PatternSet`] is
/// built it cannot fail at match time.
#[derive(Debug, Error)]
pub enum ScreenError {
    /// The pattern's structure could reintroduce catastrophic matching
    /// and was rejected before compilation.
    #[error("pattern '{id}' rejected: {reason}")]
    CatastrophicPattern {
        /// Identifier of the offending pattern.
        id: String,
        /// Which structural rule it violated.
        reason: String,
    },

    /// The regex engine refused the pattern (syntax or size limit).
    #[error("pattern '{id}' failed to compile: {source}")]
    Compile {
        /// Identifier of the offending pattern.
        id: String,
        #[source]
        source: Box<regex::Error>,
    },

    /// A pattern declared a confidence outside `[0, 1]`.
    #[error("pattern '{id}' has confidence {confidence} outside [0, 1]")]
    BadConfidence {
        /// Identifier of the offending pattern.
        id: String,
        /// The rejected value.
        confidence: f64,
    },
}
