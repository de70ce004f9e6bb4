use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use wagf_core::{
    BoosterMap, MemoryEngine, MemoryItem, MemoryMetadata, MemorySource, Result, SourceAllocation,
};

use crate::config::MemoryConfig;
use crate::score::{rank, stratify, take_deduped};

/// Keeps everything; retrieval is top-k by static importance with a recency
/// tiebreak.
pub struct ImportanceMemory {
    stores: Arc<RwLock<HashMap<String, Vec<MemoryItem>>>>,
}

impl ImportanceMemory {
    pub fn new() -> Self {
        Self {
            stores: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn ranked(&self, agent_id: &str) -> Vec<(f64, MemoryItem)> {
        let stores = self.stores.read();
        let Some(store) = stores.get(agent_id) else {
            return Vec::new();
        };
        let mut scored: Vec<(f64, MemoryItem)> = store
            .iter()
            .map(|item| (item.base_importance, item.clone()))
            .collect();
        rank(&mut scored);
        scored
    }
}

impl Default for ImportanceMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ImportanceMemory {
    fn clone(&self) -> Self {
        Self {
            stores: Arc::clone(&self.stores),
        }
    }
}

impl MemoryEngine for ImportanceMemory {
    fn add(&self, agent_id: &str, content: &str, meta: MemoryMetadata) -> Result<()> {
        let importance = meta.importance.unwrap_or(0.5);
        let item = MemoryItem::new(content, &meta, importance);
        self.stores
            .write()
            .entry(agent_id.to_string())
            .or_default()
            .push(item);
        Ok(())
    }

    fn retrieve(&self, agent_id: &str, top_k: usize, _boosters: Option<&BoosterMap>) -> Vec<String> {
        take_deduped(&self.ranked(agent_id), top_k)
    }

    fn retrieve_stratified(
        &self,
        agent_id: &str,
        allocation: Option<&SourceAllocation>,
        total_k: usize,
    ) -> Vec<String> {
        let default_allocation = MemoryConfig::default().stratified_allocation;
        let allocation: &[(MemorySource, usize)] =
            allocation.map(|a| a.as_slice()).unwrap_or(&default_allocation);
        stratify(&self.ranked(agent_id), allocation, total_k)
    }

    fn snapshot(&self, agent_id: &str) -> Vec<MemoryItem> {
        self.stores
            .read()
            .get(agent_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wagf_core::EmotionTag;

    fn meta(timestamp: u64, importance: f64) -> MemoryMetadata {
        MemoryMetadata::new(timestamp, MemorySource::Personal, EmotionTag::Major)
            .with_importance(importance)
    }

    #[test]
    fn test_top_k_by_importance() {
        let memory = ImportanceMemory::new();
        memory.add("hh_1", "minor leak", meta(1, 0.2)).unwrap();
        memory.add("hh_1", "major flood", meta(2, 0.9)).unwrap();
        memory.add("hh_1", "new levee", meta(3, 0.6)).unwrap();

        let items = memory.retrieve("hh_1", 2, None);
        assert_eq!(items, vec!["major flood", "new levee"]);
    }

    #[test]
    fn test_recency_breaks_ties() {
        let memory = ImportanceMemory::new();
        memory.add("hh_1", "older", meta(1, 0.5)).unwrap();
        memory.add("hh_1", "newer", meta(9, 0.5)).unwrap();

        let items = memory.retrieve("hh_1", 1, None);
        assert_eq!(items, vec!["newer"]);
    }

    #[test]
    fn test_full_retrieval_is_permutation_of_inserts() {
        let memory = ImportanceMemory::new();
        let contents = ["a", "b", "c", "d"];
        for (i, c) in contents.iter().enumerate() {
            memory.add("hh_1", c, meta(i as u64, 0.1 * i as f64)).unwrap();
        }

        let mut retrieved = memory.retrieve("hh_1", usize::MAX, None);
        retrieved.sort();
        assert_eq!(retrieved, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_identical_content_deduped() {
        let memory = ImportanceMemory::new();
        memory.add("hh_1", "flooded", meta(1, 0.9)).unwrap();
        memory.add("hh_1", "flooded", meta(2, 0.9)).unwrap();

        let items = memory.retrieve("hh_1", 10, None);
        assert_eq!(items.len(), 1);
    }
}
