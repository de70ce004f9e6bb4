//! Pluggable memory engines
//!
//! Three implementations share the `MemoryEngine` contract; an experiment
//! binds exactly one. `WindowMemory` is the recency baseline,
//! `ImportanceMemory` ranks by static salience, and `HumanCentricMemory` is
//! the primary design: two tiers, emotion/source weighting, exponential
//! decay and stratified retrieval.

mod config;
mod human_centric;
mod importance;
mod score;
mod window;

use std::sync::Arc;

pub use config::{EngineKind, MemoryConfig, RetrievalWeights};
pub use human_centric::HumanCentricMemory;
pub use importance::ImportanceMemory;
pub use window::WindowMemory;

use wagf_core::MemoryEngine;

/// Build the engine an experiment binds.
pub fn build_engine(config: &MemoryConfig) -> Arc<dyn MemoryEngine> {
    match config.engine {
        EngineKind::Window => Arc::new(WindowMemory::new(config.window_size)),
        EngineKind::Importance => Arc::new(ImportanceMemory::new()),
        EngineKind::HumanCentric => Arc::new(HumanCentricMemory::new(config.clone())),
    }
}
