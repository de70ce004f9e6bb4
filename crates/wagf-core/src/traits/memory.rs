//! Contract shared by the pluggable memory engines

use crate::error::Result;
use crate::memory::{MemoryItem, MemoryMetadata, MemorySource};

/// Ordered `tag_key:tag_value -> boost` pairs supplied by the caller at
/// retrieval time. Order matters: the first matching entry wins, so this is
/// a vec rather than a map.
pub type BoosterMap = Vec<(String, f64)>;

/// Per-source slot allocation for stratified retrieval.
pub type SourceAllocation = Vec<(MemorySource, usize)>;

/// One experiment binds exactly one engine. Retrieval is deterministic given
/// (store contents, current tick, booster map).
pub trait MemoryEngine: Send + Sync {
    fn add(&self, agent_id: &str, content: &str, meta: MemoryMetadata) -> Result<()>;

    /// Up to `top_k` memory contents, best first.
    fn retrieve(&self, agent_id: &str, top_k: usize, boosters: Option<&BoosterMap>) -> Vec<String>;

    /// Retrieval with per-source slots so high-importance reflections cannot
    /// crowd out everything else. Unused slots cascade to the best remaining
    /// items regardless of source.
    fn retrieve_stratified(
        &self,
        agent_id: &str,
        allocation: Option<&SourceAllocation>,
        total_k: usize,
    ) -> Vec<String>;

    /// Full item dump; test and debug use only.
    fn snapshot(&self, agent_id: &str) -> Vec<MemoryItem>;

    /// Advance the engine clock; engines with consolidation sweep here.
    fn tick(&self, _now: u64) {}
}
