//! # Warden Semantic: exemplar-driven similarity stage
//!
//! Tier 2 of the pipeline. Each failure class is represented by a set of
//! short exemplar texts whose embeddings live in a flat inner-product
//! index. A query is encoded to a unit vector, scored against every
//! exemplar, max-pooled per class and compared to per-class thresholds.
//!
//! The encoder is an injected [`Embedder`]; the stage never blocks past
//! its encode deadline and degrades to an observable synthetic verdict
//! when encoding times out. A bounded memo keyed by content hash makes
//! repeated strings skip the encoder entirely, which is what keeps the
//! stage deterministic and cheap under repeated traffic.

mod embedder;
mod index;
mod memo;
mod stage;

pub use embedder::{EmbedError, Embedder, HashingEmbedder};
pub use index::{
    ClassScore, ExemplarIndex, ExemplarSource, IndexBuilder, IndexStats, NearestExemplar,
    SemanticError,
};
pub use memo::EmbeddingMemo;
pub use stage::{SemanticConfig, SemanticStage};
