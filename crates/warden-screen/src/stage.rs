//! The pattern stage (tier 1).
//!
//! Evaluates every pattern in the active set under a cooperative budget
//! and reduces the matches to a verdict or an escalation:
//!
//! 1. an anti-pattern at ≥ `STRONG` wins outright (`pattern_antimatch`);
//!    legitimate citations must not be overridden by incidental keyword
//!    matches
//! 2. a positive match at ≥ `STRONG` blocks (`pattern_strong`)
//! 3. a short text with no match and no suspicious token allows at 0.90
//!    (`pattern_clear`)
//! 4. anything else escalates with the best signal attached

use std::time::Instant;

use tracing::{debug, warn};
use warden_contracts::{method, Escalation, FailureClass, PolicyTable, StageOutcome, Verdict};

use crate::PatternSet;

/// Confidence at which a single pattern terminates the request.
pub const STRONG: f64 = 0.85;

/// Texts at or under this many characters qualify for the `pattern_clear`
/// fast path when nothing suspicious is found.
const SHORT_TEXT_CHARS: usize = 200;

/// Tokens whose mere presence disqualifies the `pattern_clear` fast path.
/// Deliberately coarse: their only effect is routing to the next tier.
const SUSPICIOUS_TOKENS: &[&str] = &[
    "ignore",
    "instruction",
    "system prompt",
    "password",
    "secret",
    "bypass",
    "override",
    "jailbreak",
    "sudo",
    "exec(",
    "eval(",
];

/// The deterministic pattern stage.
pub struct PatternStage {
    per_pattern_budget_ms: u64,
}

impl PatternStage {
    pub fn new(per_pattern_budget_ms: u64) -> Self {
        Self {
            per_pattern_budget_ms,
        }
    }

    /// Evaluates `text` against `patterns`, stopping at `deadline`.
    ///
    /// Patterns that cannot start before the deadline are skipped and
    /// logged; the stage never blocks past its budget. Skipping weakens
    /// coverage for this one request but keeps the latency contract.
    pub fn evaluate(
        &self,
        text: &str,
        patterns: &PatternSet,
        policy: &PolicyTable,
        deadline: Instant,
    ) -> StageOutcome {
        let mut max_pos: Option<(f64, FailureClass, &str)> = None;
        let mut max_neg: Option<(f64, &str)> = None;

        for pattern in patterns.iter() {
            let now = Instant::now();
            if now >= deadline {
                warn!(pattern = %pattern.id, "pattern budget exhausted, skipping remainder");
                break;
            }

            let started = now;
            let matched = pattern.is_match(text);
            let elapsed = started.elapsed();
            if elapsed.as_millis() as u64 > self.per_pattern_budget_ms {
                warn!(
                    pattern = %pattern.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "pattern exceeded its per-pattern budget"
                );
            }
            if !matched {
                continue;
            }

            debug!(pattern = %pattern.id, class = %pattern.class, anti = pattern.anti, "pattern matched");
            if pattern.anti {
                if max_neg.map_or(true, |(c, _)| pattern.confidence > c) {
                    max_neg = Some((pattern.confidence, pattern.id.as_str()));
                }
            } else if max_pos.map_or(true, |(c, _, _)| pattern.confidence > c) {
                max_pos = Some((pattern.confidence, pattern.class, pattern.id.as_str()));
            }
        }

        // Anti-match precedence: citations beat keyword hits of equal rank.
        if let Some((neg_conf, neg_id)) = max_neg {
            if neg_conf >= STRONG {
                return StageOutcome::Terminal(Verdict::allow(
                    1,
                    method::PATTERN_ANTIMATCH,
                    neg_conf,
                    format!("anti-pattern '{neg_id}' outweighs suspicion"),
                ));
            }
        }

        if let Some((pos_conf, class, pos_id)) = max_pos {
            if pos_conf >= STRONG {
                return StageOutcome::Terminal(Verdict::detection(
                    policy.action(class),
                    1,
                    method::PATTERN_STRONG,
                    class,
                    policy.severity(class),
                    pos_conf,
                    format!("pattern '{pos_id}' matched"),
                ));
            }
            // A weak match: hand the best signal to the router.
            return StageOutcome::Escalate(Escalation {
                failure_class: class,
                confidence: pos_conf,
                tentative_action: policy.action(class),
                method: method::PATTERN_WEAK.to_string(),
                tier: 1,
            });
        }

        if self.reads_clear(text) {
            return StageOutcome::Terminal(Verdict::allow(
                1,
                method::PATTERN_CLEAR,
                0.90,
                "short text with no suspicious tokens",
            ));
        }

        StageOutcome::Escalate(Escalation::empty(1, method::PATTERN_WEAK))
    }

    /// The `pattern_clear` fast path: short and free of suspicious tokens.
    fn reads_clear(&self, text: &str) -> bool {
        if text.chars().count() > SHORT_TEXT_CHARS {
            return false;
        }
        let lowered = text.to_lowercase();
        !SUSPICIOUS_TOKENS.iter().any(|t| lowered.contains(t))
    }
}
