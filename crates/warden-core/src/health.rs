//! Tier-health monitor.
//!
//! Tracks which tier terminated each of the last N verdicts and flags a
//! drifting distribution. The pipeline is designed to settle the vast
//! majority of traffic at tier 1; a shrinking tier-1 share means the
//! pattern library has gone stale or traffic has shifted, and a growing
//! tier-3 share means the expensive reasoner is carrying load it was
//! never budgeted for.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

/// Flagging thresholds, in percent of the rolling window.
const TIER1_MIN_PCT: f64 = 80.0;
const TIER2_MAX_PCT: f64 = 15.0;
const TIER3_MAX_PCT: f64 = 5.0;

/// Distributions are not judged until the window holds this many
/// verdicts; percentages over a handful of requests are noise.
const MIN_SAMPLE: usize = 50;

/// Point-in-time health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub tier1_pct: f64,
    pub tier2_pct: f64,
    pub tier3_pct: f64,
    /// Verdicts currently in the window.
    pub window: usize,
    /// `false` when any distribution flag fired.
    pub ok: bool,
    /// Human-readable flag descriptions, empty when healthy.
    pub messages: Vec<String>,
    /// Whether the semantic tier is configured and enabled.
    pub semantic_available: bool,
    /// Whether the reasoning tier is configured and enabled.
    pub reason_available: bool,
}

/// Rolling tier distribution over the last N verdicts.
pub struct TierHealth {
    window: Mutex<VecDeque<u8>>,
    capacity: usize,
}

impl TierHealth {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
        }
    }

    /// Records the terminating tier of one verdict.
    pub fn record(&self, tier: u8) {
        let mut window = self.window.lock();
        if window.len() == self.capacity {
            window.pop_front();
        }
        window.push_back(tier.clamp(1, 3));
    }

    /// Clears the window (operator stats reset).
    pub fn reset(&self) {
        self.window.lock().clear();
    }

    /// Computes the current report. Availability flags are supplied by
    /// the pipeline, which knows its configuration.
    pub fn report(&self, semantic_available: bool, reason_available: bool) -> HealthReport {
        let window = self.window.lock();
        let total = window.len();
        let count = |t: u8| window.iter().filter(|x| **x == t).count();

        let pct = |n: usize| {
            if total == 0 {
                0.0
            } else {
                n as f64 * 100.0 / total as f64
            }
        };
        let tier1_pct = pct(count(1));
        let tier2_pct = pct(count(2));
        let tier3_pct = pct(count(3));

        let mut messages = Vec::new();
        if total >= MIN_SAMPLE {
            if tier1_pct < TIER1_MIN_PCT {
                messages.push(format!(
                    "tier 1 resolves {tier1_pct:.1}% of traffic (expected ≥ {TIER1_MIN_PCT:.0}%)"
                ));
            }
            if tier2_pct > TIER2_MAX_PCT {
                messages.push(format!(
                    "tier 2 resolves {tier2_pct:.1}% of traffic (expected ≤ {TIER2_MAX_PCT:.0}%)"
                ));
            }
            if tier3_pct > TIER3_MAX_PCT {
                messages.push(format!(
                    "tier 3 resolves {tier3_pct:.1}% of traffic (expected ≤ {TIER3_MAX_PCT:.0}%)"
                ));
            }
        }

        HealthReport {
            tier1_pct,
            tier2_pct,
            tier3_pct,
            window: total,
            ok: messages.is_empty(),
            messages,
            semantic_available,
            reason_available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_is_healthy() {
        let health = TierHealth::new(100);
        let report = health.report(true, true);
        assert!(report.ok);
        assert_eq!(report.window, 0);
        assert_eq!(report.tier1_pct, 0.0);
    }

    #[test]
    fn test_healthy_distribution_passes() {
        let health = TierHealth::new(1000);
        for _ in 0..95 {
            health.record(1);
        }
        for _ in 0..4 {
            health.record(2);
        }
        health.record(3);
        let report = health.report(true, true);
        assert!(report.ok, "messages: {:?}", report.messages);
        assert!(report.tier1_pct > 90.0);
    }

    #[test]
    fn test_tier1_erosion_flags() {
        let health = TierHealth::new(1000);
        for _ in 0..60 {
            health.record(1);
        }
        for _ in 0..40 {
            health.record(2);
        }
        let report = health.report(true, true);
        assert!(!report.ok);
        assert!(report.messages.iter().any(|m| m.contains("tier 1")));
        assert!(report.messages.iter().any(|m| m.contains("tier 2")));
    }

    #[test]
    fn test_small_sample_never_flags() {
        let health = TierHealth::new(1000);
        for _ in 0..10 {
            health.record(3);
        }
        let report = health.report(true, true);
        assert!(report.ok, "10 verdicts are not enough to judge");
    }

    #[test]
    fn test_window_is_rolling() {
        let health = TierHealth::new(100);
        // Old tier-3 storm ...
        for _ in 0..100 {
            health.record(3);
        }
        // ... fully displaced by healthy traffic.
        for _ in 0..100 {
            health.record(1);
        }
        let report = health.report(true, true);
        assert!(report.ok);
        assert_eq!(report.tier1_pct, 100.0);
    }

    #[test]
    fn test_reset_clears_window() {
        let health = TierHealth::new(100);
        for _ in 0..60 {
            health.record(3);
        }
        health.reset();
        assert_eq!(health.report(true, true).window, 0);
    }

    #[test]
    fn test_availability_is_passed_through() {
        let health = TierHealth::new(10);
        let report = health.report(true, false);
        assert!(report.semantic_available);
        assert!(!report.reason_available);
    }
}
