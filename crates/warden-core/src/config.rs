//! Configuration for the whole pipeline.
//!
//! Every knob has a documented default; a missing environment variable
//! yields the default. Nested stage configs reuse the structs of the
//! stage crates so one value cannot drift between layers.

use serde::{Deserialize, Serialize};
use warden_reason::ReasonConfig;
use warden_screen::GuardConfig;
use warden_semantic::SemanticConfig;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Input-guard knobs (size caps, statistics window).
    pub guard: GuardConfig,
    /// Semantic-stage knobs (certainty threshold, escalation floor).
    pub semantic: SemanticConfig,
    /// Reasoning-stage knobs (conservative floor).
    pub reason: ReasonConfig,

    /// Per-pattern budget in the pattern stage, milliseconds.
    pub pattern_budget_ms: u64,
    /// Encoding budget for the semantic stage, milliseconds.
    pub encode_timeout_ms: u64,
    /// Call budget for the reasoner, milliseconds.
    pub reason_timeout_ms: u64,
    /// Soft total budget: stage deadlines never extend past it.
    pub total_budget_ms: u64,
    /// Hard total budget: the pipeline returns `budget_exhausted` at it.
    pub hard_budget_ms: u64,

    /// Lower edge of the tier-1 gray band; weaker signals finalize at
    /// tier 1 instead of escalating.
    pub t1_gray_floor: f64,
    /// Minimum expected cost of the semantic stage; it is skipped when
    /// the remaining budget is smaller.
    pub t2_min_cost_ms: u64,
    /// Minimum expected cost of the reasoning stage.
    pub t3_min_cost_ms: u64,

    /// Decision-cache capacity (entries).
    pub cache_capacity: usize,
    /// Rolling window of the tier-health monitor (verdicts).
    pub health_window: usize,
    /// Inflight bound on the semantic stage. Defaults to 2 × CPU cores.
    pub t2_permits: usize,
    /// Inflight bound on the reasoning stage.
    pub t3_permits: usize,
    /// Maximum requests per batch call.
    pub batch_limit: usize,

    /// Tier-enable flags. A disabled tier is never entered; the router
    /// degrades exactly as if the dependency were unavailable.
    pub enable_semantic: bool,
    pub enable_reason: bool,
}

impl Default for WardenConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            guard: GuardConfig::default(),
            semantic: SemanticConfig::default(),
            reason: ReasonConfig::default(),
            pattern_budget_ms: 500,
            encode_timeout_ms: 3_000,
            reason_timeout_ms: 15_000,
            total_budget_ms: 5_000,
            hard_budget_ms: 15_000,
            t1_gray_floor: 0.30,
            t2_min_cost_ms: 10,
            t3_min_cost_ms: 250,
            cache_capacity: 10_000,
            health_window: 1_000,
            t2_permits: cores * 2,
            t3_permits: 4,
            batch_limit: 100,
            enable_semantic: true,
            enable_reason: true,
        }
    }
}

impl WardenConfig {
    /// Defaults overridden by `WARDEN_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning rather than failing
    /// startup; a misconfigured knob must not take the gateway down.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        read_env("WARDEN_MAX_RAW", &mut config.guard.max_raw);
        read_env("WARDEN_PATTERN_CAP", &mut config.guard.pattern_cap);
        read_env("WARDEN_VECTOR_CAP", &mut config.guard.vector_cap);
        read_env("WARDEN_PATTERN_BUDGET_MS", &mut config.pattern_budget_ms);
        read_env("WARDEN_ENCODE_TIMEOUT_MS", &mut config.encode_timeout_ms);
        read_env("WARDEN_REASON_TIMEOUT_MS", &mut config.reason_timeout_ms);
        read_env("WARDEN_TOTAL_BUDGET_MS", &mut config.total_budget_ms);
        read_env("WARDEN_HARD_BUDGET_MS", &mut config.hard_budget_ms);
        read_env("WARDEN_CACHE_CAPACITY", &mut config.cache_capacity);
        read_env("WARDEN_HEALTH_WINDOW", &mut config.health_window);
        read_env("WARDEN_T2_PERMITS", &mut config.t2_permits);
        read_env("WARDEN_T3_PERMITS", &mut config.t3_permits);
        read_env("WARDEN_BATCH_LIMIT", &mut config.batch_limit);
        read_env("WARDEN_ENABLE_SEMANTIC", &mut config.enable_semantic);
        read_env("WARDEN_ENABLE_REASON", &mut config.enable_reason);
        config
    }
}

fn read_env<T: std::str::FromStr>(name: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(var = name, value = %raw, "ignoring unparseable env override"),
        }
    }
}
