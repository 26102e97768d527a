//! Bounded embedding memo.
//!
//! Maps content hashes to embeddings so repeated strings skip the
//! encoder. Two-generation eviction: when the hot generation fills, it
//! becomes the cold generation and the previous cold one is dropped.
//! Recently used entries therefore survive at least one rotation, which
//! is all a memo needs.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

type Key = [u8; 32];

#[derive(Default)]
struct Generations {
    hot: HashMap<Key, Arc<Vec<f32>>>,
    cold: HashMap<Key, Arc<Vec<f32>>>,
}

/// Thread-safe memo of `sha256(text) → embedding`.
pub struct EmbeddingMemo {
    generations: Mutex<Generations>,
    half_capacity: usize,
}

impl EmbeddingMemo {
    /// `capacity` bounds the total number of retained embeddings across
    /// both generations.
    pub fn new(capacity: usize) -> Self {
        Self {
            generations: Mutex::new(Generations::default()),
            half_capacity: (capacity / 2).max(1),
        }
    }

    /// Stable key for a text.
    pub fn key(text: &str) -> Key {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.finalize().into()
    }

    /// Looks up an embedding, promoting cold hits to the hot generation.
    pub fn get(&self, key: &Key) -> Option<Arc<Vec<f32>>> {
        let mut guard = self.generations.lock();
        let generations = &mut *guard;
        if let Some(hit) = generations.hot.get(key) {
            return Some(Arc::clone(hit));
        }
        if let Some(hit) = generations.cold.remove(key) {
            generations.hot.insert(*key, Arc::clone(&hit));
            return Some(hit);
        }
        None
    }

    /// Inserts an embedding, rotating generations at capacity.
    pub fn insert(&self, key: Key, embedding: Arc<Vec<f32>>) {
        let mut guard = self.generations.lock();
        let generations = &mut *guard;
        if generations.hot.len() >= self.half_capacity {
            generations.cold = std::mem::take(&mut generations.hot);
        }
        generations.hot.insert(key, embedding);
    }

    /// Number of retained embeddings.
    pub fn len(&self) -> usize {
        let generations = self.generations.lock();
        generations.hot.len() + generations.cold.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_after_insert() {
        let memo = EmbeddingMemo::new(8);
        let key = EmbeddingMemo::key("hello");
        memo.insert(key, Arc::new(vec![1.0, 2.0]));
        assert_eq!(memo.get(&key).unwrap().as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn test_miss_for_unknown_key() {
        let memo = EmbeddingMemo::new(8);
        assert!(memo.get(&EmbeddingMemo::key("unknown")).is_none());
    }

    #[test]
    fn test_rotation_bounds_size() {
        let memo = EmbeddingMemo::new(4);
        for i in 0..100 {
            memo.insert(EmbeddingMemo::key(&format!("text-{i}")), Arc::new(vec![i as f32]));
        }
        assert!(memo.len() <= 4);
    }

    #[test]
    fn test_recent_entry_survives_rotation() {
        let memo = EmbeddingMemo::new(4); // half capacity = 2
        let keep = EmbeddingMemo::key("keep");
        memo.insert(keep, Arc::new(vec![1.0]));
        memo.insert(EmbeddingMemo::key("a"), Arc::new(vec![2.0]));
        // This insert rotates; "keep" moves to the cold generation.
        memo.insert(EmbeddingMemo::key("b"), Arc::new(vec![3.0]));
        assert!(memo.get(&keep).is_some(), "entry must survive one rotation");
    }

    #[test]
    fn test_keys_differ_per_text() {
        assert_ne!(EmbeddingMemo::key("a"), EmbeddingMemo::key("b"));
    }
}
