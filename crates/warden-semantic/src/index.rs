//! The exemplar vector index.
//!
//! A flat inner-product index over unit-normalized exemplar embeddings,
//! one label per vector. Class-level scoring max-pools over the class's
//! exemplars: one strongly similar exemplar is a hit even when the rest
//! of the class is unrelated.
//!
//! The index is immutable once built. Hot reload builds a fresh index
//! off-line and publishes it atomically; the content hash participates
//! in decision-cache keys so stale cached verdicts die with the index
//! that produced them.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;
use warden_contracts::{FailureClass, PolicyTable};

use crate::embedder::normalize_in_place;

/// Errors of index construction and query.
#[derive(Debug, Error)]
pub enum SemanticError {
    /// An exemplar's embedding does not match the index dimension.
    /// At build time this fails the load; at query time it is a
    /// programming error surfaced as an internal-error verdict.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimension fixed at index creation.
        expected: usize,
        /// Dimension of the offending vector.
        got: usize,
    },

    /// The encoder was unavailable; the stage is skipped, not failed.
    #[error("semantic stage skipped: {0}")]
    Skipped(String),
}

/// One exemplar's provenance, kept for operator diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExemplarSource {
    /// Shipped with the binary.
    Builtin,
    /// Loaded from the policy document.
    Policy,
}

/// Max-pooled similarity of one class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassScore {
    pub class: FailureClass,
    /// Maximum inner product over the class's exemplars, in `[-1, 1]`.
    pub score: f64,
}

/// A nearest exemplar, for debugging and `--explain` output.
#[derive(Debug, Clone, Serialize)]
pub struct NearestExemplar {
    pub class: FailureClass,
    pub text: String,
    pub score: f64,
}

/// Summary statistics for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub total_exemplars: usize,
    pub classes: BTreeMap<FailureClass, usize>,
    pub dimension: usize,
    /// First 8 hex characters of the content hash.
    pub short_hash: String,
}

/// Builder accumulating exemplars before the index is frozen.
///
/// The dimension is fixed by the first exemplar added; mixing dimensions
/// is a load-time error.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    dimension: Option<usize>,
    vectors: Vec<f32>,
    labels: Vec<FailureClass>,
    texts: Vec<String>,
    sources: Vec<ExemplarSource>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one exemplar. The embedding is unit-normalized here so the
    /// index only ever holds unit vectors.
    pub fn add(
        &mut self,
        class: FailureClass,
        text: impl Into<String>,
        mut embedding: Vec<f32>,
        source: ExemplarSource,
    ) -> Result<(), SemanticError> {
        let dim = *self.dimension.get_or_insert(embedding.len());
        if embedding.len() != dim {
            return Err(SemanticError::DimensionMismatch {
                expected: dim,
                got: embedding.len(),
            });
        }
        normalize_in_place(&mut embedding);
        self.vectors.extend_from_slice(&embedding);
        self.labels.push(class);
        self.texts.push(text.into());
        self.sources.push(source);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Freezes the builder into an immutable index, resolving per-class
    /// thresholds from `policy` (override or family default).
    pub fn build(self, policy: &PolicyTable) -> ExemplarIndex {
        let dimension = self.dimension.unwrap_or(0);

        let mut hasher = Sha256::new();
        hasher.update(dimension.to_le_bytes());
        for (i, label) in self.labels.iter().enumerate() {
            hasher.update(label.as_str().as_bytes());
            hasher.update(self.texts[i].as_bytes());
            let row = &self.vectors[i * dimension..(i + 1) * dimension];
            for value in row {
                hasher.update(value.to_le_bytes());
            }
        }
        let content_hash = hex_digest(hasher);

        let mut thresholds = BTreeMap::new();
        for class in FailureClass::ALL {
            if class != FailureClass::None {
                thresholds.insert(class, policy.threshold(class));
            }
        }

        ExemplarIndex {
            dimension,
            vectors: self.vectors,
            labels: self.labels,
            texts: self.texts,
            sources: self.sources,
            thresholds,
            content_hash,
        }
    }
}

/// The frozen exemplar index.
#[derive(Debug, Clone)]
pub struct ExemplarIndex {
    dimension: usize,
    vectors: Vec<f32>,
    labels: Vec<FailureClass>,
    texts: Vec<String>,
    #[allow(dead_code)]
    sources: Vec<ExemplarSource>,
    thresholds: BTreeMap<FailureClass, f64>,
    content_hash: String,
}

impl ExemplarIndex {
    /// An index with no exemplars. Queries score nothing; the stage
    /// reports a clean pass.
    pub fn empty(policy: &PolicyTable) -> Self {
        IndexBuilder::new().build(policy)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Hex content hash of all exemplars and vectors. Participates in
    /// decision-cache keys and in reload logging.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Effective similarity threshold for a class.
    pub fn threshold(&self, class: FailureClass) -> f64 {
        self.thresholds.get(&class).copied().unwrap_or(1.0)
    }

    /// Max-pooled score per class for a unit query vector, restricted to
    /// `candidates` when provided.
    ///
    /// Returns one entry per class that has at least one exemplar, in
    /// deterministic class order.
    pub fn search(
        &self,
        query: &[f32],
        candidates: Option<&[FailureClass]>,
    ) -> Result<Vec<ClassScore>, SemanticError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(SemanticError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }

        let mut best: BTreeMap<FailureClass, f64> = BTreeMap::new();
        for (i, label) in self.labels.iter().enumerate() {
            if let Some(filter) = candidates {
                if !filter.contains(label) {
                    continue;
                }
            }
            let row = &self.vectors[i * self.dimension..(i + 1) * self.dimension];
            let score = dot(query, row);
            let entry = best.entry(*label).or_insert(f64::MIN);
            if score > *entry {
                *entry = score;
            }
        }

        Ok(best
            .into_iter()
            .map(|(class, score)| ClassScore { class, score })
            .collect())
    }

    /// The `k` most similar exemplars, for operator diagnostics.
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<NearestExemplar>, SemanticError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(SemanticError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }

        let mut scored: Vec<(usize, f64)> = (0..self.labels.len())
            .map(|i| {
                let row = &self.vectors[i * self.dimension..(i + 1) * self.dimension];
                (i, dot(query, row))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| NearestExemplar {
                class: self.labels[i],
                text: self.texts[i].clone(),
                score,
            })
            .collect())
    }

    pub fn stats(&self) -> IndexStats {
        let mut classes: BTreeMap<FailureClass, usize> = BTreeMap::new();
        for label in &self.labels {
            *classes.entry(*label).or_insert(0) += 1;
        }
        IndexStats {
            total_exemplars: self.labels.len(),
            classes,
            dimension: self.dimension,
            short_hash: self.content_hash.chars().take(8).collect(),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum()
}

fn hex_digest(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}
