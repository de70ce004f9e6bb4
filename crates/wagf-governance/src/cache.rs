use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use wagf_core::SkillProposal;

/// A previously approved decision, keyed by a fingerprint of (agent state,
/// context hash).
#[derive(Debug, Clone)]
pub struct CachedDecision {
    pub proposal: SkillProposal,
    pub final_skill: String,
}

/// Optional short-circuit for repeated identical decisions. A hit is never
/// trusted blindly: the broker replays the identity rules against the
/// current agent state and invalidates the entry on mismatch.
#[derive(Default)]
pub struct DecisionCache {
    entries: RwLock<HashMap<u64, CachedDecision>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DecisionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// FNV-1a over the state digest and the assembled prompt. The state
    /// digest covers every field a validator may read.
    pub fn fingerprint(state_digest: &str, prompt: &str) -> u64 {
        let mut hash = 0xcbf2_9ce4_8422_2325u64;
        for byte in state_digest.bytes().chain([0u8]).chain(prompt.bytes()) {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }

    pub fn get(&self, fingerprint: u64) -> Option<CachedDecision> {
        let found = self.entries.read().get(&fingerprint).cloned();
        match &found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, fingerprint: u64, decision: CachedDecision) {
        self.entries.write().insert(fingerprint, decision);
    }

    pub fn invalidate(&self, fingerprint: u64) {
        self.entries.write().remove(&fingerprint);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(skill: &str) -> CachedDecision {
        CachedDecision {
            proposal: SkillProposal::new("hh_1", skill),
            final_skill: skill.to_string(),
        }
    }

    #[test]
    fn test_fingerprint_sensitivity() {
        let base = DecisionCache::fingerprint("abcd", "prompt");
        assert_eq!(base, DecisionCache::fingerprint("abcd", "prompt"));
        assert_ne!(base, DecisionCache::fingerprint("abce", "prompt"));
        assert_ne!(base, DecisionCache::fingerprint("abcd", "prompt!"));
    }

    #[test]
    fn test_hit_miss_and_ratio() {
        let cache = DecisionCache::new();
        let key = DecisionCache::fingerprint("state", "prompt");

        assert!(cache.get(key).is_none());
        cache.insert(key, decision("elevate_house"));
        assert_eq!(cache.get(key).unwrap().final_skill, "elevate_house");
        assert!((cache.hit_ratio() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_invalidation_leaves_a_miss() {
        let cache = DecisionCache::new();
        let key = DecisionCache::fingerprint("state", "prompt");
        cache.insert(key, decision("elevate_house"));

        cache.invalidate(key);
        assert!(cache.get(key).is_none());
        assert!(cache.is_empty());
    }
}
