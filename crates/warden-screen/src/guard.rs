//! Input guard: length cap, normalization, pathological-input detection
//! and fixed attack signatures.
//!
//! The guard runs before any configurable matcher. Its job is to make the
//! worst case cheap: a repetition flood or an oversized payload must cost
//! microseconds, not a trip through the regex library or the encoder.
//! Checks run in a fixed order and the first terminal one wins.

use regex::Regex;
use tracing::{debug, warn};
use warden_contracts::{method, Action, FailureClass, PolicyTable, Verdict};

/// Size and window knobs for the guard.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GuardConfig {
    /// Hard cap on raw input, in bytes. Larger payloads are blocked.
    pub max_raw: usize,
    /// Prefix window, in bytes, over which cheap statistics are computed.
    pub window: usize,
    /// Kept-text cap handed to the pattern stage, in bytes.
    pub pattern_cap: usize,
    /// Kept-text cap handed to the semantic stage, in bytes.
    pub vector_cap: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_raw: 10_000,
            window: 500,
            pattern_cap: 500,
            vector_cap: 1_000,
        }
    }
}

/// Normalized input with per-stage views.
///
/// Both views are prefixes of the same normalized string, truncated at a
/// character boundary so downstream stages never see broken UTF-8.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardedText {
    normalized: String,
    pattern_cap: usize,
    vector_cap: usize,
}

impl GuardedText {
    /// The full normalized text (NUL-stripped, whitespace-collapsed,
    /// trimmed). Cache keys are computed over this.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// View for the pattern stage, bounded by `PATTERN_CAP`.
    pub fn pattern_text(&self) -> &str {
        truncate_at_boundary(&self.normalized, self.pattern_cap)
    }

    /// View for the semantic stage, bounded by `VECTOR_CAP`.
    pub fn vector_text(&self) -> &str {
        truncate_at_boundary(&self.normalized, self.vector_cap)
    }
}

/// Result of guarding one input.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardOutcome {
    /// The guard terminated the request itself.
    Terminal(Verdict),
    /// The input passed; the pipeline continues with these views.
    Clean(GuardedText),
}

/// A fixed attack signature.
///
/// Signatures are compiled at construction and never reloaded: the guard
/// is the pre-regex line of defense and must not itself be configurable
/// into a pathological matcher.
struct Signature {
    matcher: Regex,
    class: FailureClass,
    confidence: f64,
    label: &'static str,
}

/// The input guard (tier 1, pre-pattern).
pub struct InputGuard {
    config: GuardConfig,
    signatures: Vec<Signature>,
}

impl InputGuard {
    /// Builds a guard with the default knobs.
    pub fn new() -> Self {
        Self::with_config(GuardConfig::default())
    }

    /// Builds a guard with custom knobs.
    pub fn with_config(config: GuardConfig) -> Self {
        Self {
            config,
            signatures: Self::build_signatures(),
        }
    }

    /// The well-known attack signatures, cheapest-to-match first.
    fn build_signatures() -> Vec<Signature> {
        vec![
            Signature {
                matcher: Regex::new(
                    r"(?i)\b(select|union|insert|update|delete|drop)\b[^;]{0,200}(--|;|\bor\s+1\s*=\s*1\b)",
                )
                .unwrap(),
                class: FailureClass::SqlInjection,
                confidence: 0.90,
                label: "SQL keyword with terminator or tautology",
            },
            Signature {
                matcher: Regex::new(r"(?i)<\s*script\b").unwrap(),
                class: FailureClass::Xss,
                confidence: 0.90,
                label: "script tag",
            },
            Signature {
                matcher: Regex::new(r"(\.\./){2,}|(\.\.\\){2,}").unwrap(),
                class: FailureClass::PathTraversal,
                confidence: 0.88,
                label: "repeated parent-directory traversal",
            },
            Signature {
                matcher: Regex::new(r"(?i)[;&|`]\s*(rm|curl|wget|nc|bash|sh|chmod|cat)\b")
                    .unwrap(),
                class: FailureClass::CommandInjection,
                confidence: 0.88,
                label: "shell metacharacter followed by known binary",
            },
        ]
    }

    /// Runs the ordered guard checks on one raw input.
    ///
    /// Order matters:
    ///
    /// 1. empty input → low-confidence `allow`
    /// 2. oversize → `block` (pathological)
    /// 3. prefix-window statistics → `block` (pathological)
    /// 4. attack signatures → `block` with the signature's class
    /// 5. otherwise normalize and truncate for the later stages
    ///
    /// Step 3 runs before any regex is evaluated, which is what removes
    /// repetition floods from the matcher's worst case.
    pub fn inspect(&self, text: &str, policy: &PolicyTable) -> GuardOutcome {
        if text.trim().is_empty() {
            return GuardOutcome::Terminal(Verdict::allow(
                1,
                method::GUARD_EMPTY,
                0.50,
                "empty or whitespace-only input",
            ));
        }

        if text.len() > self.config.max_raw {
            warn!(len = text.len(), cap = self.config.max_raw, "oversized input blocked");
            return GuardOutcome::Terminal(self.pathological(
                policy,
                0.70,
                format!("input is {} bytes (cap {})", text.len(), self.config.max_raw),
            ));
        }

        if let Some(reason) = self.window_statistics(text) {
            warn!(reason = %reason, "pathological input blocked");
            return GuardOutcome::Terminal(self.pathological(policy, 0.95, reason));
        }

        for sig in &self.signatures {
            if sig.matcher.is_match(text) {
                debug!(class = %sig.class, label = sig.label, "attack signature matched");
                return GuardOutcome::Terminal(Verdict::detection(
                    policy.action(sig.class),
                    1,
                    method::GUARD_SIGNATURE,
                    sig.class,
                    policy.severity(sig.class),
                    sig.confidence,
                    sig.label,
                ));
            }
        }

        GuardOutcome::Clean(GuardedText {
            normalized: normalize(text),
            pattern_cap: self.config.pattern_cap,
            vector_cap: self.config.vector_cap,
        })
    }

    /// Cheap statistics over the first `window` bytes.
    ///
    /// Flags inputs of length ≥ 50 whose prefix is dominated by a single
    /// character (ratio > 0.80) or uses fewer than 5 distinct characters.
    fn window_statistics(&self, text: &str) -> Option<String> {
        let prefix = truncate_at_boundary(text, self.config.window);
        let mut counts = std::collections::HashMap::new();
        let mut total = 0usize;
        for c in prefix.chars() {
            *counts.entry(c).or_insert(0usize) += 1;
            total += 1;
        }
        if total < 50 {
            return None;
        }
        let max = counts.values().copied().max().unwrap_or(0);
        let ratio = max as f64 / total as f64;
        if ratio > 0.80 {
            return Some(format!("single character dominates input ({:.0}%)", ratio * 100.0));
        }
        if counts.len() < 5 {
            return Some(format!(
                "low character diversity ({} distinct in {} chars)",
                counts.len(),
                total
            ));
        }
        None
    }

    fn pathological(&self, policy: &PolicyTable, confidence: f64, explanation: String) -> Verdict {
        Verdict::detection(
            Action::Block,
            1,
            method::GUARD_PATHOLOGICAL,
            FailureClass::PathologicalInput,
            policy.severity(FailureClass::PathologicalInput),
            confidence,
            explanation,
        )
    }
}

impl Default for InputGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalizes raw input: strips NUL bytes, collapses runs of whitespace
/// into single spaces and trims the ends. Equivalent inputs collapse to
/// the same normalized form, which is what makes the decision cache key
/// meaningful.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_whitespace = false;
    for c in text.chars() {
        if c == '\0' {
            continue;
        }
        if c.is_whitespace() {
            in_whitespace = true;
            continue;
        }
        if in_whitespace && !out.is_empty() {
            out.push(' ');
        }
        in_whitespace = false;
        out.push(c);
    }
    out
}

/// Truncates to at most `max_bytes`, backing off to a character boundary.
fn truncate_at_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
