//! Core types and traits for the WAGF governed broker

pub mod agent;
pub mod error;
pub mod memory;
pub mod proposal;
pub mod report;
pub mod scale;
pub mod traits;
pub mod validation;

pub use agent::{AgentSnapshot, EffectOp, EnvironmentalState, SkillEffect};
pub use error::{Result, WagfError};
pub use memory::{EmotionTag, MemoryItem, MemoryKind, MemoryMetadata, MemorySource, ReflectionInsight};
pub use proposal::{SkillProposal, TokenCounts};
pub use report::{DecisionAttempt, InterventionReport, Outcome};
pub use scale::OrdinalLabel;
pub use traits::llm::{LlmError, LlmInvoke, LlmReply};
pub use traits::memory::{BoosterMap, MemoryEngine, SourceAllocation};
pub use traits::simulation::SimulationEngine;
pub use validation::{Severity, ValidationResult};
