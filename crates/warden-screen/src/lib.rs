//! # Warden Screen: input guard and pattern stage
//!
//! The deterministic front half of the pipeline:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       warden-screen                        │
//! ├────────────────────────────────────────────────────────────┤
//! │                                                            │
//! │   raw text ──▶ ┌─────────────┐      ┌─────────────────┐    │
//! │                │ Input Guard │ ───▶ │  Pattern Stage  │    │
//! │                │  (tier 1)   │      │    (tier 1)     │    │
//! │                └─────────────┘      └─────────────────┘    │
//! │                      │                      │              │
//! │              terminal verdict      verdict or escalation   │
//! │                                                            │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The guard converts catastrophic inputs (oversized payloads, character
//! floods, textbook injection signatures) into sub-millisecond verdicts
//! before any configurable regex runs. The pattern stage then evaluates a
//! confidence-scored pattern library under a cooperative per-pattern
//! budget, with a load-time structural check that rejects catastrophic
//! regex shapes.

mod error;
mod guard;
mod patterns;
mod stage;

pub use error::ScreenError;
pub use guard::{normalize, GuardConfig, GuardOutcome, GuardedText, InputGuard};
pub use patterns::{Pattern, PatternSet, PatternSpec};
pub use stage::{PatternStage, STRONG};
