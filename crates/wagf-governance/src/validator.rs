use wagf_core::{AgentSnapshot, Result, SkillProposal, ValidationResult};
use wagf_skills::SkillRegistry;

use crate::rules::ValidatorFamily;

/// Everything a rule may read. Validators never mutate any of it.
pub struct ValidationContext<'a> {
    pub agent: &'a AgentSnapshot,
    pub year: u32,
    pub registry: &'a SkillRegistry,
    /// Skill ids currently eligible for this agent, in declared order.
    pub eligible: Vec<String>,
    /// Previous-year snapshots of observable neighbors.
    pub neighbors: &'a [AgentSnapshot],
    pub fallback_skill: &'a str,
    /// Whether the institutional block had content this year; grounding
    /// rules use it.
    pub has_institutional_context: bool,
}

impl<'a> ValidationContext<'a> {
    pub fn new(agent: &'a AgentSnapshot, year: u32, registry: &'a SkillRegistry) -> Self {
        let eligible = registry.eligible_ids(agent);
        Self {
            agent,
            year,
            registry,
            eligible,
            neighbors: &[],
            fallback_skill: registry.default_skill(),
            has_institutional_context: false,
        }
    }

    pub fn with_neighbors(mut self, neighbors: &'a [AgentSnapshot]) -> Self {
        self.neighbors = neighbors;
        self
    }

    pub fn with_fallback(mut self, fallback: &'a str) -> Self {
        self.fallback_skill = fallback;
        self
    }

    pub fn with_institutional_context(mut self, present: bool) -> Self {
        self.has_institutional_context = present;
        self
    }

    /// Eligible alternatives to a blocked skill, fallback excluded so the
    /// suggestion list never collapses to "do nothing".
    pub fn alternatives_to(&self, blocked: &str) -> Vec<String> {
        self.eligible
            .iter()
            .filter(|id| id.as_str() != blocked && id.as_str() != self.fallback_skill)
            .cloned()
            .collect()
    }
}

/// A pure function from (proposal, context) to validation results.
///
/// Returning `Err` is fatal for the whole experiment: a buggy validator
/// must never silently approve an action.
pub trait Validator: Send + Sync {
    fn id(&self) -> &str;

    fn family(&self) -> ValidatorFamily;

    /// Declared priority within the family; lower fires first.
    fn priority(&self) -> i32 {
        0
    }

    fn validate(
        &self,
        proposal: &SkillProposal,
        ctx: &ValidationContext<'_>,
    ) -> Result<Vec<ValidationResult>>;
}
