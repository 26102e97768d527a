//! Escalation decisions between tiers.
//!
//! The router is deliberately stateless: pure predicates over the
//! escalation carried out of a stage plus the remaining budget, and
//! materializers that turn an escalation into a final verdict when the
//! next tier cannot run. Keeping this logic out of the orchestrator
//! makes every band boundary unit-testable without spinning up stages.

use warden_contracts::{Action, Escalation, PolicyTable, Verdict};
use warden_screen::STRONG;

/// Band boundaries the router consults.
#[derive(Debug, Clone, Copy)]
pub struct RouterBands {
    /// Lower edge of the tier-1 gray band.
    pub gray_floor: f64,
    /// Lower edge of the tier-2 → tier-3 escalation band.
    pub escalation_floor: f64,
    /// Tier-2 certainty threshold (upper edge of the band).
    pub certain: f64,
}

/// Should the tier-1 escalation proceed to the semantic stage?
///
/// Yes when tier 1 saw no signal at all, or when its best signal sits in
/// the gray band `[gray_floor, strong)`. A weak nonzero signal below the
/// gray band finalizes at tier 1.
pub fn wants_semantic(escalation: &Escalation, bands: RouterBands) -> bool {
    if escalation.is_silent() {
        return true;
    }
    (bands.gray_floor..STRONG).contains(&escalation.confidence)
}

/// Should the tier-2 escalation proceed to the reasoning stage?
///
/// The semantic stage only escalates scores in `[escalation_floor,
/// certain)`, so any tier-2 escalation qualifies; the check is kept
/// explicit so a misbehaving stage cannot smuggle traffic to tier 3.
pub fn wants_reason(escalation: &Escalation, bands: RouterBands) -> bool {
    escalation.tier == 2
        && (bands.escalation_floor..bands.certain).contains(&escalation.confidence)
}

/// Does a stage with the given minimum expected cost fit the remaining
/// budget? The router never enters a stage it cannot afford.
pub fn fits_budget(remaining_ms: u64, min_cost_ms: u64) -> bool {
    remaining_ms >= min_cost_ms
}

/// Materializes an escalation into a final verdict when no further tier
/// can run (disabled, unavailable, or out of budget).
///
/// Tier-1 block proposals below the strong threshold degrade to allow:
/// a weak pattern hint is not enough evidence to block on by itself.
/// Tier-2 signals are enforced as proposed; they crossed a calibrated
/// class threshold.
pub fn materialize(escalation: &Escalation, policy: &PolicyTable) -> Verdict {
    if escalation.is_silent() {
        return Verdict::allow(
            escalation.tier.clamp(1, 3),
            &escalation.method,
            0.50,
            "no stage produced a signal",
        );
    }

    let mut action = escalation.tentative_action;
    if action == Action::Block && escalation.tier == 1 && escalation.confidence < STRONG {
        action = Action::Allow;
    }

    if action == Action::Allow {
        return Verdict::allow(
            escalation.tier.clamp(1, 3),
            &escalation.method,
            (1.0 - escalation.confidence).max(0.0),
            format!(
                "weak '{}' signal ({:.2}) below enforcement",
                escalation.failure_class, escalation.confidence
            ),
        );
    }

    Verdict::detection(
        action,
        escalation.tier.clamp(1, 3),
        &escalation.method,
        escalation.failure_class,
        policy.severity(escalation.failure_class),
        escalation.confidence,
        format!(
            "'{}' at {:.2} enforced without further escalation",
            escalation.failure_class, escalation.confidence
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_contracts::{method, FailureClass};

    fn bands() -> RouterBands {
        RouterBands {
            gray_floor: 0.30,
            escalation_floor: 0.60,
            certain: 0.78,
        }
    }

    fn t1(confidence: f64, action: Action) -> Escalation {
        Escalation {
            failure_class: FailureClass::PromptInjection,
            confidence,
            tentative_action: action,
            method: method::PATTERN_WEAK.to_string(),
            tier: 1,
        }
    }

    fn t2(confidence: f64) -> Escalation {
        Escalation {
            failure_class: FailureClass::PromptInjection,
            confidence,
            tentative_action: Action::Block,
            method: method::SEMANTIC.to_string(),
            tier: 2,
        }
    }

    #[test]
    fn test_silent_t1_wants_semantic() {
        assert!(wants_semantic(&Escalation::empty(1, method::PATTERN_WEAK), bands()));
    }

    #[test]
    fn test_gray_band_wants_semantic() {
        assert!(wants_semantic(&t1(0.30, Action::Block), bands()));
        assert!(wants_semantic(&t1(0.55, Action::Block), bands()));
        assert!(wants_semantic(&t1(0.84, Action::Block), bands()));
    }

    #[test]
    fn test_below_gray_band_finalizes_at_t1() {
        assert!(!wants_semantic(&t1(0.10, Action::Warn), bands()));
    }

    #[test]
    fn test_t2_band_wants_reason() {
        assert!(wants_reason(&t2(0.60), bands()));
        assert!(wants_reason(&t2(0.70), bands()));
        assert!(!wants_reason(&t2(0.78), bands()));
        assert!(!wants_reason(&t2(0.50), bands()));
    }

    #[test]
    fn test_t1_escalation_never_goes_straight_to_reason() {
        assert!(!wants_reason(&t1(0.70, Action::Block), bands()));
    }

    #[test]
    fn test_budget_guard() {
        assert!(fits_budget(100, 10));
        assert!(!fits_budget(5, 10));
    }

    #[test]
    fn test_materialize_weak_t1_block_degrades_to_allow() {
        let v = materialize(&t1(0.55, Action::Block), &PolicyTable::default());
        assert!(v.is_allowed());
        assert_eq!(v.tier_used, 1);
    }

    #[test]
    fn test_materialize_t1_warn_is_enforced() {
        let mut esc = t1(0.45, Action::Warn);
        esc.failure_class = FailureClass::Overconfidence;
        let v = materialize(&esc, &PolicyTable::default());
        assert_eq!(v.action, Action::Warn);
        assert_eq!(v.failure_class, FailureClass::Overconfidence);
    }

    #[test]
    fn test_materialize_t2_block_is_enforced() {
        let v = materialize(&t2(0.70), &PolicyTable::default());
        assert!(v.is_blocked());
        assert_eq!(v.tier_used, 2);
        assert_eq!(v.method, method::SEMANTIC);
    }

    #[test]
    fn test_materialize_silent_is_allow() {
        let v = materialize(&Escalation::empty(2, method::SEMANTIC_CLEAR), &PolicyTable::default());
        assert!(v.is_allowed());
        assert!((v.confidence - 0.50).abs() < 1e-9);
    }
}
