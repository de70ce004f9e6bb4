use tracing::trace;

use wagf_core::{Result, SkillProposal, ValidationResult};

use crate::builtin::{
    AffordabilityValidator, GroundingValidator, IdentityValidator, NeighborhoodValidator,
};
use crate::rules::{ConfiguredRuleValidator, GovernanceRule, ValidatorFamily};
use crate::validator::{ValidationContext, Validator};

/// The composed validator chain. Families run in their fixed order; within
/// a family, validators run in declared priority order; every rule of a
/// family fires before the first ERROR aborts the remaining families.
/// Composition is fixed at experiment build time.
pub struct ValidatorChain {
    validators: Vec<Box<dyn Validator>>,
}

impl ValidatorChain {
    pub fn new(validators: Vec<Box<dyn Validator>>) -> Self {
        let mut chain = Self { validators };
        chain.sort();
        chain
    }

    /// The standard composition: built-in identity, affordability,
    /// neighborhood and grounding validators plus every configured rule.
    pub fn standard(rules: Vec<GovernanceRule>, fallback_skill: &str) -> Self {
        let mut validators: Vec<Box<dyn Validator>> = vec![
            Box::new(IdentityValidator),
            Box::new(AffordabilityValidator::default()),
            Box::new(NeighborhoodValidator::new(fallback_skill)),
            Box::new(GroundingValidator::default()),
        ];
        for rule in rules {
            validators.push(Box::new(ConfiguredRuleValidator::new(rule)));
        }
        Self::new(validators)
    }

    pub fn with_validator(mut self, validator: Box<dyn Validator>) -> Self {
        self.validators.push(validator);
        self.sort();
        self
    }

    fn sort(&mut self) {
        self.validators
            .sort_by_key(|v| (v.family(), v.priority()));
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Run the full chain. An `Err` from any validator is fatal.
    pub fn run(
        &self,
        proposal: &SkillProposal,
        ctx: &ValidationContext<'_>,
    ) -> Result<Vec<ValidationResult>> {
        let mut collected = Vec::new();

        for family in ValidatorFamily::ORDER {
            let results = self.run_family(family, proposal, ctx)?;
            let blocked = results.iter().any(ValidationResult::is_blocking);
            collected.extend(results);
            if blocked {
                trace!(family = family.as_str(), "validation stopped at blocking family");
                break;
            }
        }

        Ok(collected)
    }

    /// Run a single family; the cache uses this to replay identity rules.
    pub fn run_family(
        &self,
        family: ValidatorFamily,
        proposal: &SkillProposal,
        ctx: &ValidationContext<'_>,
    ) -> Result<Vec<ValidationResult>> {
        let mut results = Vec::new();
        for validator in self.validators.iter().filter(|v| v.family() == family) {
            results.extend(validator.validate(proposal, ctx)?);
        }
        Ok(results)
    }
}
