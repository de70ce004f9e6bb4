use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use wagf_core::{
    BoosterMap, MemoryEngine, MemoryItem, MemoryMetadata, MemorySource, Result, SourceAllocation,
};

use crate::config::MemoryConfig;
use crate::score::{boost_for, rank, stratify, take_deduped};

#[derive(Default)]
struct AgentStore {
    working: Vec<MemoryItem>,
    long_term: Vec<MemoryItem>,
}

/// The primary engine: two tiers per agent, emotion/source-weighted
/// importance at insertion, exponential decay on the long-term tier, and a
/// periodic consolidation sweep that promotes salient working memories.
pub struct HumanCentricMemory {
    config: MemoryConfig,
    stores: Arc<RwLock<HashMap<String, AgentStore>>>,
    clock: AtomicU64,
}

impl HumanCentricMemory {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            stores: Arc::new(RwLock::new(HashMap::new())),
            clock: AtomicU64::new(0),
        }
    }

    fn now(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }

    /// Composite score against the current clock. Working-tier items use
    /// their undecayed base importance.
    fn scored(&self, agent_id: &str, boosters: Option<&BoosterMap>) -> Vec<(f64, MemoryItem)> {
        let now = self.now();
        let weights = self.config.weights;
        let lambda = self.config.decay_rate;

        let mut stores = self.stores.write();
        let Some(store) = stores.get_mut(agent_id) else {
            return Vec::new();
        };

        let mut scored = Vec::with_capacity(store.working.len() + store.long_term.len());

        for item in &mut store.working {
            item.decayed_importance = item.base_importance;
        }
        for item in &mut store.long_term {
            let age = item.age(now) as f64;
            item.decayed_importance = item.base_importance * (-lambda * age).exp();
        }

        for item in store.working.iter().chain(store.long_term.iter()) {
            let age = item.age(now) as f64;
            let recency = (1.0 - age / now.max(1) as f64).clamp(0.0, 1.0);
            let score = weights.recency * recency
                + weights.importance * item.decayed_importance
                + weights.contextual * boost_for(item, boosters);
            scored.push((score, item.clone()));
        }

        rank(&mut scored);
        scored
    }
}

impl Clone for HumanCentricMemory {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            stores: Arc::clone(&self.stores),
            clock: AtomicU64::new(self.now()),
        }
    }
}

impl MemoryEngine for HumanCentricMemory {
    fn add(&self, agent_id: &str, content: &str, meta: MemoryMetadata) -> Result<()> {
        let base = meta.importance.unwrap_or_else(|| {
            self.config.emotion_weight(meta.emotion) * self.config.source_weight(meta.source)
        });
        let item = MemoryItem::new(content, &meta, base);

        self.clock.fetch_max(meta.timestamp, Ordering::Relaxed);

        let mut stores = self.stores.write();
        let store = stores.entry(agent_id.to_string()).or_default();
        store.working.push(item);

        // evict oldest working items, skipping those pending consolidation
        let threshold = self.config.consolidation_threshold;
        while store.working.len() > self.config.working_capacity {
            match store
                .working
                .iter()
                .position(|i| i.base_importance < threshold)
            {
                Some(index) => {
                    store.working.remove(index);
                }
                None => break,
            }
        }
        Ok(())
    }

    fn retrieve(&self, agent_id: &str, top_k: usize, boosters: Option<&BoosterMap>) -> Vec<String> {
        take_deduped(&self.scored(agent_id, boosters), top_k)
    }

    fn retrieve_stratified(
        &self,
        agent_id: &str,
        allocation: Option<&SourceAllocation>,
        total_k: usize,
    ) -> Vec<String> {
        let allocation: &[(MemorySource, usize)] = allocation
            .map(|a| a.as_slice())
            .unwrap_or(&self.config.stratified_allocation);
        stratify(&self.scored(agent_id, None), allocation, total_k)
    }

    fn snapshot(&self, agent_id: &str) -> Vec<MemoryItem> {
        let stores = self.stores.read();
        let Some(store) = stores.get(agent_id) else {
            return Vec::new();
        };
        store
            .working
            .iter()
            .chain(store.long_term.iter())
            .cloned()
            .collect()
    }

    /// Advance the clock and run the consolidation sweep: working-tier items
    /// at or above the threshold move to the long-term tier.
    fn tick(&self, now: u64) {
        self.clock.fetch_max(now, Ordering::Relaxed);
        let threshold = self.config.consolidation_threshold;

        let mut stores = self.stores.write();
        for (agent_id, store) in stores.iter_mut() {
            let mut promoted = 0usize;
            let mut index = 0;
            while index < store.working.len() {
                if store.working[index].base_importance >= threshold {
                    let mut item = store.working.remove(index);
                    item.consolidated = true;
                    store.long_term.push(item);
                    promoted += 1;
                } else {
                    index += 1;
                }
            }
            if promoted > 0 {
                debug!(agent = %agent_id, promoted, "consolidated working memories");
            }
        }
    }
}
