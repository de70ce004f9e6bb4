use wagf_core::{Result, Severity, SkillProposal, ValidationResult};

use crate::rules::ValidatorFamily;
use crate::validator::{ValidationContext, Validator};

/// Physical / identity rules restated from the skill registry: the skill
/// must exist, match the agent type, not be a completed one-time action,
/// and its preconditions must hold against the current snapshot.
pub struct IdentityValidator;

impl Validator for IdentityValidator {
    fn id(&self) -> &str {
        "identity"
    }

    fn family(&self) -> ValidatorFamily {
        ValidatorFamily::Physical
    }

    fn validate(
        &self,
        proposal: &SkillProposal,
        ctx: &ValidationContext<'_>,
    ) -> Result<Vec<ValidationResult>> {
        let Some(skill_id) = proposal.skill.as_deref() else {
            return Ok(Vec::new());
        };

        let Some(skill) = ctx.registry.lookup(skill_id) else {
            return Ok(vec![
                ValidationResult::error("unknown_skill", format!("'{skill_id}' is not a known action"))
                    .with_alternatives(ctx.alternatives_to(skill_id)),
            ]);
        };

        if !skill.eligible_agent_type(&ctx.agent.agent_type) {
            return Ok(vec![
                ValidationResult::error(
                    "wrong_agent_type",
                    format!("'{skill_id}' is not available to {} agents", ctx.agent.agent_type),
                )
                .with_alternatives(ctx.alternatives_to(skill_id)),
            ]);
        }

        if skill.already_done(ctx.agent) {
            let flag = skill.done_when.as_deref().unwrap_or("done");
            return Ok(vec![
                ValidationResult::error(
                    format!("already_{flag}"),
                    format!("'{skill_id}' has already been carried out"),
                )
                .with_alternatives(ctx.alternatives_to(skill_id)),
            ]);
        }

        if let Some(failed) = skill.first_failed_precondition(ctx.agent) {
            return Ok(vec![
                ValidationResult::error(
                    format!("precondition_{}", failed.field()),
                    format!("'{skill_id}' requires: {}", failed.describe()),
                )
                .with_alternatives(ctx.alternatives_to(skill_id)),
            ]);
        }

        Ok(Vec::new())
    }
}

/// Personal feasibility: the proposed skill's cost must fit the agent's
/// available resources.
pub struct AffordabilityValidator {
    resource_field: String,
}

impl AffordabilityValidator {
    pub fn new(resource_field: impl Into<String>) -> Self {
        Self {
            resource_field: resource_field.into(),
        }
    }
}

impl Default for AffordabilityValidator {
    fn default() -> Self {
        Self::new("funds")
    }
}

impl Validator for AffordabilityValidator {
    fn id(&self) -> &str {
        "affordability"
    }

    fn family(&self) -> ValidatorFamily {
        ValidatorFamily::Personal
    }

    fn validate(
        &self,
        proposal: &SkillProposal,
        ctx: &ValidationContext<'_>,
    ) -> Result<Vec<ValidationResult>> {
        let Some(skill_id) = proposal.skill.as_deref() else {
            return Ok(Vec::new());
        };
        let Some(skill) = ctx.registry.lookup(skill_id) else {
            return Ok(Vec::new());
        };
        let Some(available) = ctx.agent.number(&self.resource_field) else {
            return Ok(Vec::new());
        };

        if skill.cost > available {
            let affordable: Vec<String> = ctx
                .alternatives_to(skill_id)
                .into_iter()
                .filter(|id| {
                    ctx.registry
                        .lookup(id)
                        .map(|s| s.cost <= available)
                        .unwrap_or(false)
                })
                .collect();
            return Ok(vec![
                ValidationResult::error(
                    "insufficient_funds",
                    format!(
                        "'{skill_id}' costs {} but only {} is available",
                        skill.cost, available
                    ),
                )
                .with_alternatives(affordable),
            ]);
        }

        Ok(Vec::new())
    }
}

const NEIGHBORHOOD_SAMPLE_MIN: usize = 3;

/// Social alignment with the observable neighborhood; warning-only.
pub struct NeighborhoodValidator {
    fallback_skill: String,
}

impl NeighborhoodValidator {
    pub fn new(fallback_skill: impl Into<String>) -> Self {
        Self {
            fallback_skill: fallback_skill.into(),
        }
    }
}

impl Validator for NeighborhoodValidator {
    fn id(&self) -> &str {
        "neighborhood_alignment"
    }

    fn family(&self) -> ValidatorFamily {
        ValidatorFamily::Social
    }

    fn validate(
        &self,
        proposal: &SkillProposal,
        ctx: &ValidationContext<'_>,
    ) -> Result<Vec<ValidationResult>> {
        let Some(skill_id) = proposal.skill.as_deref() else {
            return Ok(Vec::new());
        };
        if ctx.neighbors.len() < NEIGHBORHOOD_SAMPLE_MIN || skill_id != self.fallback_skill {
            return Ok(Vec::new());
        }

        let acting = ctx
            .neighbors
            .iter()
            .filter(|n| {
                n.last_decision()
                    .map(|d| d != self.fallback_skill)
                    .unwrap_or(false)
            })
            .count();

        if acting * 2 > ctx.neighbors.len() {
            return Ok(vec![ValidationResult::warning(
                "against_neighborhood_trend",
                format!(
                    "{acting} of {} observable neighbors took protective action last year",
                    ctx.neighbors.len()
                ),
            )]);
        }

        Ok(Vec::new())
    }
}

/// Semantic grounding: reasoning must refer to things that exist in the
/// simulation. Warning by default; severity is configurable per experiment.
pub struct GroundingValidator {
    severity: Severity,
}

impl GroundingValidator {
    pub fn new(severity: Severity) -> Self {
        Self { severity }
    }

    fn result(&self, rule_id: &str, reason: String) -> ValidationResult {
        match self.severity {
            Severity::Error => ValidationResult::error(rule_id, reason),
            Severity::Warning => ValidationResult::warning(rule_id, reason),
        }
    }
}

impl Default for GroundingValidator {
    fn default() -> Self {
        Self::new(Severity::Warning)
    }
}

impl Validator for GroundingValidator {
    fn id(&self) -> &str {
        "grounding"
    }

    fn family(&self) -> ValidatorFamily {
        ValidatorFamily::Semantic
    }

    fn validate(
        &self,
        proposal: &SkillProposal,
        ctx: &ValidationContext<'_>,
    ) -> Result<Vec<ValidationResult>> {
        let reasoning = proposal.reasoning.to_ascii_lowercase();
        if reasoning.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();

        if reasoning.contains("neighbor") && ctx.neighbors.is_empty() {
            results.push(self.result(
                "ungrounded_neighbors",
                "reasoning cites neighbors but none are observable".into(),
            ));
        }

        if (reasoning.contains("subsid") || reasoning.contains("government program"))
            && !ctx.has_institutional_context
        {
            results.push(self.result(
                "ungrounded_institution",
                "reasoning cites institutional support that was not announced".into(),
            ));
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wagf_core::AgentSnapshot;
    use wagf_skills::SkillRegistry;

    const REGISTRY: &str = r#"
default_skill: do_nothing
skills:
  - id: do_nothing
    description: "Nothing"
  - id: buy_insurance
    description: "Insure"
    agent_types: [household]
    preconditions:
      - field: insured
        equals: false
    cost: 500
  - id: elevate_house
    description: "Elevate"
    agent_types: [household]
    preconditions:
      - field: elevated
        equals: false
    one_time: true
    done_when: elevated
    cost: 20000
  - id: maintain_demand
    description: "Maintain"
    agent_types: [irrigation_district]
"#;

    fn registry() -> SkillRegistry {
        SkillRegistry::load_str(REGISTRY).unwrap()
    }

    fn agent(elevated: bool, funds: f64) -> AgentSnapshot {
        AgentSnapshot::new("hh_1", "household")
            .with_state("elevated", json!(elevated))
            .with_state("insured", json!(false))
            .with_state("funds", json!(funds))
    }

    #[test]
    fn test_identity_unknown_skill() {
        let registry = registry();
        let agent = agent(false, 5000.0);
        let ctx = ValidationContext::new(&agent, 1, &registry);

        let results = IdentityValidator
            .validate(&SkillProposal::new("hh_1", "relocate"), &ctx)
            .unwrap();
        assert_eq!(results[0].rule_id, "unknown_skill");
        assert!(results[0].is_blocking());
        assert!(!results[0].alternatives.is_empty());
    }

    #[test]
    fn test_identity_already_elevated() {
        let registry = registry();
        let agent = agent(true, 50000.0);
        let ctx = ValidationContext::new(&agent, 1, &registry);

        let results = IdentityValidator
            .validate(&SkillProposal::new("hh_1", "elevate_house"), &ctx)
            .unwrap();
        assert_eq!(results[0].rule_id, "already_elevated");
    }

    #[test]
    fn test_identity_wrong_agent_type() {
        let registry = registry();
        let agent = agent(false, 5000.0);
        let ctx = ValidationContext::new(&agent, 1, &registry);

        let results = IdentityValidator
            .validate(&SkillProposal::new("hh_1", "maintain_demand"), &ctx)
            .unwrap();
        assert_eq!(results[0].rule_id, "wrong_agent_type");
    }

    #[test]
    fn test_identity_passes_valid_proposal() {
        let registry = registry();
        let agent = agent(false, 5000.0);
        let ctx = ValidationContext::new(&agent, 1, &registry);

        let results = IdentityValidator
            .validate(&SkillProposal::new("hh_1", "buy_insurance"), &ctx)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_affordability_blocks_and_suggests() {
        let registry = registry();
        let agent = agent(false, 5000.0);
        let ctx = ValidationContext::new(&agent, 1, &registry);

        let results = AffordabilityValidator::default()
            .validate(&SkillProposal::new("hh_1", "elevate_house"), &ctx)
            .unwrap();
        assert_eq!(results[0].rule_id, "insufficient_funds");
        assert_eq!(results[0].alternatives, vec!["buy_insurance"]);
    }

    #[test]
    fn test_affordability_passes_within_means() {
        let registry = registry();
        let agent = agent(false, 5000.0);
        let ctx = ValidationContext::new(&agent, 1, &registry);

        let results = AffordabilityValidator::default()
            .validate(&SkillProposal::new("hh_1", "buy_insurance"), &ctx)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_neighborhood_warning_only() {
        let registry = registry();
        let agent = agent(false, 5000.0);
        let neighbors: Vec<AgentSnapshot> = (0..4)
            .map(|i| {
                let mut n = AgentSnapshot::new(format!("hh_{}", i + 2), "household");
                n.recent_decisions = vec!["buy_insurance".into()];
                n
            })
            .collect();
        let ctx = ValidationContext::new(&agent, 1, &registry).with_neighbors(&neighbors);

        let results = NeighborhoodValidator::new("do_nothing")
            .validate(&SkillProposal::new("hh_1", "do_nothing"), &ctx)
            .unwrap();
        assert_eq!(results[0].rule_id, "against_neighborhood_trend");
        assert!(!results[0].is_blocking());
    }

    #[test]
    fn test_grounding_neighbors_cited_with_none() {
        let registry = registry();
        let agent = agent(false, 5000.0);
        let ctx = ValidationContext::new(&agent, 1, &registry);

        let proposal = SkillProposal::new("hh_1", "do_nothing")
            .with_reasoning("my neighbors all stayed put");
        let results = GroundingValidator::default().validate(&proposal, &ctx).unwrap();
        assert_eq!(results[0].rule_id, "ungrounded_neighbors");
        assert!(!results[0].is_blocking());
    }

    #[test]
    fn test_grounding_quiet_when_grounded() {
        let registry = registry();
        let agent = agent(false, 5000.0);
        let neighbors = vec![AgentSnapshot::new("hh_2", "household")];
        let ctx = ValidationContext::new(&agent, 1, &registry)
            .with_neighbors(&neighbors)
            .with_institutional_context(true);

        let proposal = SkillProposal::new("hh_1", "do_nothing")
            .with_reasoning("my neighbor took the subsidy");
        assert!(GroundingValidator::default().validate(&proposal, &ctx).unwrap().is_empty());
    }
}
