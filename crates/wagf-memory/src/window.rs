use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;

use wagf_core::{BoosterMap, MemoryEngine, MemoryItem, MemoryMetadata, Result, SourceAllocation};

/// Recency baseline: the most recent N items per agent, retrieved in
/// chronological order. No salience, no tiers.
pub struct WindowMemory {
    stores: Arc<RwLock<HashMap<String, VecDeque<MemoryItem>>>>,
    capacity: usize,
}

impl WindowMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            stores: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Clone for WindowMemory {
    fn clone(&self) -> Self {
        Self {
            stores: Arc::clone(&self.stores),
            capacity: self.capacity,
        }
    }
}

impl MemoryEngine for WindowMemory {
    fn add(&self, agent_id: &str, content: &str, meta: MemoryMetadata) -> Result<()> {
        let importance = meta.importance.unwrap_or(0.5);
        let item = MemoryItem::new(content, &meta, importance);

        let mut stores = self.stores.write();
        let store = stores.entry(agent_id.to_string()).or_default();
        store.push_back(item);
        while store.len() > self.capacity {
            store.pop_front();
        }
        Ok(())
    }

    fn retrieve(&self, agent_id: &str, top_k: usize, _boosters: Option<&BoosterMap>) -> Vec<String> {
        let stores = self.stores.read();
        let Some(store) = stores.get(agent_id) else {
            return Vec::new();
        };
        let start = store.len().saturating_sub(top_k);
        store.iter().skip(start).map(|i| i.content.clone()).collect()
    }

    fn retrieve_stratified(
        &self,
        agent_id: &str,
        _allocation: Option<&SourceAllocation>,
        total_k: usize,
    ) -> Vec<String> {
        // the baseline has no salience to stratify over
        self.retrieve(agent_id, total_k, None)
    }

    fn snapshot(&self, agent_id: &str) -> Vec<MemoryItem> {
        self.stores
            .read()
            .get(agent_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wagf_core::{EmotionTag, MemorySource};

    fn meta(timestamp: u64) -> MemoryMetadata {
        MemoryMetadata::new(timestamp, MemorySource::Personal, EmotionTag::Routine)
    }

    #[test]
    fn test_window_eviction() {
        let memory = WindowMemory::new(3);
        for i in 0..5u64 {
            memory.add("hh_1", &format!("event {i}"), meta(i)).unwrap();
        }

        let items = memory.retrieve("hh_1", 10, None);
        assert_eq!(items, vec!["event 2", "event 3", "event 4"]);
    }

    #[test]
    fn test_chronological_order_and_limit() {
        let memory = WindowMemory::new(10);
        for i in 0..5u64 {
            memory.add("hh_1", &format!("event {i}"), meta(i)).unwrap();
        }

        let items = memory.retrieve("hh_1", 2, None);
        assert_eq!(items, vec!["event 3", "event 4"]);
    }

    #[test]
    fn test_unknown_agent_is_empty() {
        let memory = WindowMemory::new(3);
        assert!(memory.retrieve("ghost", 5, None).is_empty());
        assert!(memory.snapshot("ghost").is_empty());
    }

    #[test]
    fn test_clone_shares_state() {
        let a = WindowMemory::new(5);
        let b = a.clone();
        a.add("hh_1", "seen by both", meta(1)).unwrap();
        assert_eq!(b.retrieve("hh_1", 5, None).len(), 1);
    }
}
