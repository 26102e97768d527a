//! The decision cache (tier-independent memoization of final verdicts).
//!
//! Keys bind the normalized text to the snapshot that produced the
//! verdict: `sha256(normalized_text ‖ version ‖ index_hash)`. A policy
//! reload changes the version and the index hash, so every stale entry
//! dies logically without a sweep. There is no TTL.
//!
//! Eviction is LRU with lazy deletion: the order queue may hold stale
//! stamps for re-touched keys; eviction pops entries until it finds one
//! whose stamp is current. Amortized O(1) per operation.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use warden_contracts::{method, Verdict};

type Key = [u8; 32];

/// Cache key for one normalized text under one snapshot.
pub fn cache_key(normalized_text: &str, version: u64, index_hash: &str) -> Key {
    let mut hasher = Sha256::new();
    hasher.update(normalized_text.as_bytes());
    hasher.update([0u8]);
    hasher.update(version.to_le_bytes());
    hasher.update(index_hash.as_bytes());
    hasher.finalize().into()
}

/// Methods whose verdicts may be memoized. Transient outcomes (budget
/// exhaustion, internal errors, timeouts, reasoner fallbacks) must not
/// become sticky.
pub fn is_cacheable(verdict: &Verdict) -> bool {
    matches!(
        verdict.method.as_str(),
        method::PATTERN_STRONG
            | method::PATTERN_ANTIMATCH
            | method::PATTERN_CLEAR
            | method::PATTERN_WEAK
            | method::SEMANTIC
            | method::SEMANTIC_CLEAR
            | method::REASON
    )
}

struct Entry {
    verdict: Verdict,
    stamp: u64,
}

struct Inner {
    map: HashMap<Key, Entry>,
    order: VecDeque<(Key, u64)>,
    next_stamp: u64,
}

/// Bounded LRU of full verdicts.
pub struct DecisionCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl DecisionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                next_stamp: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Looks up a verdict, marking it as a cache hit.
    ///
    /// The stored `processing_time_ms` of the original computation is
    /// preserved; only `cache_hit` flips to `true`.
    pub fn get(&self, key: &Key) -> Option<Verdict> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let stamp = inner.next_stamp;
        inner.next_stamp += 1;
        let entry = inner.map.get_mut(key)?;
        entry.stamp = stamp;
        let mut verdict = entry.verdict.clone();
        inner.order.push_back((*key, stamp));
        verdict.cache_hit = true;
        Some(verdict)
    }

    /// Stores a verdict, evicting the least recently used entry at
    /// capacity. Non-cacheable verdicts are ignored.
    pub fn insert(&self, key: Key, verdict: &Verdict) {
        if !is_cacheable(verdict) {
            return;
        }
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let stamp = inner.next_stamp;
        inner.next_stamp += 1;

        let fresh = !inner.map.contains_key(&key);
        if fresh && inner.map.len() >= self.capacity {
            // Lazy deletion: skip queue entries whose stamp is stale.
            while let Some((candidate, s)) = inner.order.pop_front() {
                let current = inner.map.get(&candidate).map(|e| e.stamp) == Some(s);
                if current {
                    inner.map.remove(&candidate);
                    break;
                }
            }
        }

        let mut stored = verdict.clone();
        stored.cache_hit = false;
        inner.map.insert(
            key,
            Entry {
                verdict: stored,
                stamp,
            },
        );
        inner.order.push_back((key, stamp));
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry (operator command; reload does not need this).
    pub fn clear(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.map.clear();
        inner.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_contracts::Verdict;

    fn verdict(label: &str) -> Verdict {
        Verdict::allow(1, method::PATTERN_CLEAR, 0.9, label).timed(3.5)
    }

    #[test]
    fn test_key_binds_text_version_and_index() {
        let base = cache_key("text", 1, "hash-a");
        assert_ne!(base, cache_key("other", 1, "hash-a"));
        assert_ne!(base, cache_key("text", 2, "hash-a"));
        assert_ne!(base, cache_key("text", 1, "hash-b"));
        assert_eq!(base, cache_key("text", 1, "hash-a"));
    }

    #[test]
    fn test_hit_sets_flag_and_preserves_timing() {
        let cache = DecisionCache::new(4);
        let key = cache_key("t", 1, "h");
        cache.insert(key, &verdict("original"));

        let hit = cache.get(&key).unwrap();
        assert!(hit.cache_hit);
        assert!((hit.processing_time_ms - 3.5).abs() < f64::EPSILON);
        assert_eq!(hit.explanation, "original");
    }

    #[test]
    fn test_miss_returns_none() {
        let cache = DecisionCache::new(4);
        assert!(cache.get(&cache_key("missing", 1, "h")).is_none());
    }

    #[test]
    fn test_lru_evicts_oldest_untouched() {
        let cache = DecisionCache::new(2);
        let a = cache_key("a", 1, "h");
        let b = cache_key("b", 1, "h");
        let c = cache_key("c", 1, "h");

        cache.insert(a, &verdict("a"));
        cache.insert(b, &verdict("b"));
        // Touch `a` so `b` is now least recently used.
        assert!(cache.get(&a).is_some());
        cache.insert(c, &verdict("c"));

        assert!(cache.get(&a).is_some(), "touched entry must survive");
        assert!(cache.get(&b).is_none(), "LRU entry must be evicted");
        assert!(cache.get(&c).is_some());
        assert!(cache.len() <= 2);
    }

    #[test]
    fn test_reinsert_same_key_does_not_grow() {
        let cache = DecisionCache::new(2);
        let key = cache_key("same", 1, "h");
        for i in 0..10 {
            cache.insert(key, &verdict(&format!("v{i}")));
        }
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key).unwrap().explanation, "v9");
    }

    #[test]
    fn test_transient_verdicts_are_not_cached() {
        let cache = DecisionCache::new(4);
        let key = cache_key("t", 1, "h");
        let mut transient = verdict("x");
        transient.method = method::BUDGET_EXHAUSTED.to_string();
        cache.insert(key, &transient);
        assert!(cache.get(&key).is_none());

        let mut timeout = verdict("y");
        timeout.method = method::SEMANTIC_TIMEOUT.to_string();
        cache.insert(key, &timeout);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_clear_empties_cache() {
        let cache = DecisionCache::new(4);
        cache.insert(cache_key("a", 1, "h"), &verdict("a"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_bound_under_churn() {
        let cache = DecisionCache::new(8);
        for i in 0..1000 {
            cache.insert(cache_key(&format!("t{i}"), 1, "h"), &verdict("v"));
        }
        assert!(cache.len() <= 8);
    }
}
