//! Skill definitions and registry
//!
//! The registry is the source of truth for the discrete action set: which
//! skills exist, who may attempt them, what they are allowed to change.

mod definition;
mod registry;

pub use definition::{EffectSpec, Polarity, Precondition, SkillDefinition};
pub use registry::{DescribeFormat, SkillRegistry};
