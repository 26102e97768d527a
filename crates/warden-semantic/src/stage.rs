//! The semantic-similarity stage (tier 2).
//!
//! Encodes the query under a deadline, max-pools exemplar similarity per
//! class and resolves multi-class triggers deterministically:
//!
//! 1. highest severity wins (policy lookup)
//! 2. ties break on score
//! 3. remaining ties break lexicographically on class id
//!
//! A score at or above the certainty threshold terminates; a score in
//! the escalation band hands the router a tentative verdict it may send
//! to the reasoning tier; anything below the band is a clean pass.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};
use warden_contracts::{
    method, Action, Escalation, FailureClass, PolicyTable, StageOutcome, Verdict,
};

use crate::{ClassScore, EmbedError, Embedder, EmbeddingMemo, ExemplarIndex, SemanticError};
use crate::embedder::normalize_in_place;

/// Tuning knobs of the semantic stage.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SemanticConfig {
    /// Scores at or above this terminate at tier 2.
    pub certain_threshold: f64,
    /// Scores at or above this (but below certain) may escalate to tier 3.
    pub escalation_floor: f64,
    /// Bound on the embedding memo.
    pub memo_capacity: usize,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            certain_threshold: 0.78,
            escalation_floor: 0.60,
            memo_capacity: 2_048,
        }
    }
}

/// The semantic stage. Owns the embedding memo; the index and policy are
/// snapshot state passed per request.
pub struct SemanticStage {
    config: SemanticConfig,
    memo: EmbeddingMemo,
}

impl SemanticStage {
    pub fn new(config: SemanticConfig) -> Self {
        let memo = EmbeddingMemo::new(config.memo_capacity);
        Self { config, memo }
    }

    pub fn config(&self) -> &SemanticConfig {
        &self.config
    }

    /// Encodes `text` (memo first) and scores it against the index.
    ///
    /// Outcomes:
    /// - `Terminal` with `semantic` when a class triggers at or above the
    ///   certainty threshold
    /// - `Terminal` with `semantic_clear` when every score is below the
    ///   escalation floor
    /// - `Terminal` with `semantic_timeout` when encoding misses the
    ///   deadline (observable, never an unbounded wait)
    /// - `Escalate` when the best score sits in the escalation band
    /// - `Err(Skipped)` when the encoder is unavailable; the router moves
    ///   on without a tier-2 opinion
    pub async fn evaluate(
        &self,
        text: &str,
        index: &ExemplarIndex,
        policy: &PolicyTable,
        embedder: &dyn Embedder,
        candidates: Option<&[FailureClass]>,
        deadline: Instant,
    ) -> Result<StageOutcome, SemanticError> {
        let query = match self.encode(text, embedder, deadline).await {
            Ok(query) => query,
            Err(EncodeOutcome::TimedOut) => {
                warn!("embedding encoder missed its deadline");
                return Ok(StageOutcome::Terminal(Verdict::allow(
                    2,
                    method::SEMANTIC_TIMEOUT,
                    0.0,
                    "encoder missed its deadline; no semantic opinion",
                )));
            }
            Err(EncodeOutcome::Unavailable(reason)) => {
                return Err(SemanticError::Skipped(reason));
            }
        };

        let scores = index.search(&query, candidates)?;
        let best_overall = scores
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .copied();

        let mut triggered: Vec<ClassScore> = scores
            .iter()
            .filter(|s| s.score >= index.threshold(s.class))
            .copied()
            .collect();
        triggered.sort_by(|a, b| rank(policy, a, b));

        if let Some(hit) = triggered.first() {
            debug!(class = %hit.class, score = hit.score, "exemplar class triggered");
            if hit.score >= self.config.certain_threshold {
                return Ok(StageOutcome::Terminal(Verdict::detection(
                    policy.action(hit.class),
                    2,
                    method::SEMANTIC,
                    hit.class,
                    policy.severity(hit.class),
                    hit.score,
                    format!("similar to {} exemplars (score {:.2})", hit.class, hit.score),
                )));
            }
            // Triggered but not certain: tentative, the router may ask
            // the reasoning tier.
            return Ok(StageOutcome::Escalate(Escalation {
                failure_class: hit.class,
                confidence: hit.score,
                tentative_action: policy.action(hit.class),
                method: method::SEMANTIC.to_string(),
                tier: 2,
            }));
        }

        let max_score = best_overall.map(|s| s.score).unwrap_or(0.0).max(0.0);
        if let Some(best) = best_overall {
            if max_score >= self.config.escalation_floor {
                // Nothing crossed its class threshold, but the best score
                // is close enough that a deeper look is warranted.
                return Ok(StageOutcome::Escalate(Escalation {
                    failure_class: best.class,
                    confidence: max_score,
                    tentative_action: Action::Allow,
                    method: method::SEMANTIC_CLEAR.to_string(),
                    tier: 2,
                }));
            }
        }

        Ok(StageOutcome::Terminal(Verdict::allow(
            2,
            method::SEMANTIC_CLEAR,
            1.0 - max_score,
            format!("no exemplar class triggered (best score {max_score:.2})"),
        )))
    }

    /// Memo-first encoding under the deadline.
    async fn encode(
        &self,
        text: &str,
        embedder: &dyn Embedder,
        deadline: Instant,
    ) -> Result<Arc<Vec<f32>>, EncodeOutcome> {
        let key = EmbeddingMemo::key(text);
        if let Some(hit) = self.memo.get(&key) {
            return Ok(hit);
        }

        let tokio_deadline = tokio::time::Instant::from_std(deadline);
        let encoded = tokio::time::timeout_at(tokio_deadline, embedder.embed(text, deadline)).await;
        match encoded {
            Ok(Ok(mut vector)) => {
                normalize_in_place(&mut vector);
                let vector = Arc::new(vector);
                self.memo.insert(key, Arc::clone(&vector));
                Ok(vector)
            }
            Ok(Err(EmbedError::Unavailable(reason))) => Err(EncodeOutcome::Unavailable(reason)),
            Ok(Err(EmbedError::Failed(reason))) => Err(EncodeOutcome::Unavailable(reason)),
            Err(_elapsed) => Err(EncodeOutcome::TimedOut),
        }
    }
}

enum EncodeOutcome {
    TimedOut,
    Unavailable(String),
}

/// Deterministic ordering of triggered classes: severity, then score,
/// then class id.
fn rank(policy: &PolicyTable, a: &ClassScore, b: &ClassScore) -> Ordering {
    policy
        .severity(a.class)
        .cmp(&policy.severity(b.class))
        .then_with(|| b.score.total_cmp(&a.score))
        .then_with(|| a.class.as_str().cmp(b.class.as_str()))
}
