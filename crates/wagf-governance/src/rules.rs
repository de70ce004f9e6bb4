use evalexpr::{
    ContextWithMutableVariables, EvalexprError, HashMapContext, Value as EvalValue,
    eval_boolean_with_context,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use wagf_core::{Result, Severity, SkillProposal, ValidationResult, WagfError};

use crate::validator::{ValidationContext, Validator};

/// Evaluation order is fixed: Physical -> Thinking -> Personal -> Social ->
/// Semantic. The first ERROR in a family aborts later families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorFamily {
    Physical,
    Thinking,
    Personal,
    Social,
    Semantic,
}

impl ValidatorFamily {
    pub const ORDER: [ValidatorFamily; 5] = [
        ValidatorFamily::Physical,
        ValidatorFamily::Thinking,
        ValidatorFamily::Personal,
        ValidatorFamily::Social,
        ValidatorFamily::Semantic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidatorFamily::Physical => "physical",
            ValidatorFamily::Thinking => "thinking",
            ValidatorFamily::Personal => "personal",
            ValidatorFamily::Social => "social",
            ValidatorFamily::Semantic => "semantic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceMode {
    Disabled,
    #[default]
    Strict,
}

/// A governance rule loaded from configuration. The condition is an
/// expression over construct labels (`TP`, `TP_rank`, ...), the proposed
/// `skill`, and the agent's state fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceRule {
    pub id: String,

    #[serde(default = "default_family")]
    pub family: ValidatorFamily,

    #[serde(default = "default_severity")]
    pub severity: Severity,

    pub condition: String,

    /// When set, the rule only applies to proposals of this skill.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_skill: Option<String>,

    /// Reason template; `{skill}` and `{agent}` are substituted.
    pub reason: String,

    /// Explicit alternatives; when empty, eligible skills are suggested.
    #[serde(default)]
    pub suggest: Vec<String>,

    #[serde(default)]
    pub priority: i32,
}

fn default_family() -> ValidatorFamily {
    ValidatorFamily::Thinking
}

fn default_severity() -> Severity {
    Severity::Error
}

/// Evaluates one configured rule with evalexpr. A condition referencing a
/// construct the proposal did not emit simply does not fire; any other
/// evaluation failure is a fatal rule bug.
pub struct ConfiguredRuleValidator {
    rule: GovernanceRule,
}

impl ConfiguredRuleValidator {
    pub fn new(rule: GovernanceRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &GovernanceRule {
        &self.rule
    }

    fn eval_context(
        proposal: &SkillProposal,
        ctx: &ValidationContext<'_>,
    ) -> Result<HashMapContext> {
        let mut eval = HashMapContext::new();
        let set = |eval: &mut HashMapContext, key: &str, value: EvalValue| {
            eval.set_value(key.to_string(), value)
                .map_err(|e| WagfError::RuleEvaluation {
                    rule: "<context>".into(),
                    message: e.to_string(),
                })
        };

        set(
            &mut eval,
            "skill",
            EvalValue::String(proposal.skill.clone().unwrap_or_default()),
        )?;
        set(&mut eval, "year", EvalValue::Int(ctx.year as i64))?;
        set(
            &mut eval,
            "neighbor_count",
            EvalValue::Int(ctx.neighbors.len() as i64),
        )?;

        for (name, label) in &proposal.constructs {
            set(&mut eval, name, EvalValue::String(label.code().to_string()))?;
            set(
                &mut eval,
                &format!("{name}_rank"),
                EvalValue::Int(label.rank() as i64),
            )?;
        }

        for (field, value) in &ctx.agent.state {
            let eval_value = match value {
                Value::Bool(b) => EvalValue::Boolean(*b),
                Value::Number(n) => match n.as_f64() {
                    Some(f) => EvalValue::Float(f),
                    None => continue,
                },
                Value::String(s) => EvalValue::String(s.clone()),
                _ => continue,
            };
            set(&mut eval, field, eval_value)?;
        }

        Ok(eval)
    }

    fn render_reason(&self, proposal: &SkillProposal, ctx: &ValidationContext<'_>) -> String {
        self.rule
            .reason
            .replace("{skill}", proposal.skill.as_deref().unwrap_or("?"))
            .replace("{agent}", &ctx.agent.id)
    }
}

impl Validator for ConfiguredRuleValidator {
    fn id(&self) -> &str {
        &self.rule.id
    }

    fn family(&self) -> ValidatorFamily {
        self.rule.family
    }

    fn priority(&self) -> i32 {
        self.rule.priority
    }

    fn validate(
        &self,
        proposal: &SkillProposal,
        ctx: &ValidationContext<'_>,
    ) -> Result<Vec<ValidationResult>> {
        if let Some(blocked) = &self.rule.blocked_skill {
            if proposal.skill.as_deref() != Some(blocked.as_str()) {
                return Ok(Vec::new());
            }
        }

        let eval = Self::eval_context(proposal, ctx)?;
        let fired = match eval_boolean_with_context(&self.rule.condition, &eval) {
            Ok(result) => result,
            // a partial-key rule over constructs the model did not label
            Err(EvalexprError::VariableIdentifierNotFound(_)) => false,
            Err(error) => {
                return Err(WagfError::RuleEvaluation {
                    rule: self.rule.id.clone(),
                    message: error.to_string(),
                });
            }
        };

        if !fired {
            return Ok(Vec::new());
        }

        let reason = self.render_reason(proposal, ctx);
        let alternatives = if self.rule.suggest.is_empty() {
            ctx.alternatives_to(proposal.skill.as_deref().unwrap_or_default())
        } else {
            self.rule.suggest.clone()
        };

        let result = match self.rule.severity {
            Severity::Error => ValidationResult::error(&self.rule.id, reason),
            Severity::Warning => ValidationResult::warning(&self.rule.id, reason),
        };
        Ok(vec![result.with_alternatives(alternatives)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wagf_core::{AgentSnapshot, OrdinalLabel};
    use wagf_skills::SkillRegistry;

    const REGISTRY: &str = r#"
default_skill: do_nothing
skills:
  - id: do_nothing
    description: "Nothing"
  - id: buy_insurance
    description: "Insure"
    preconditions:
      - field: insured
        equals: false
  - id: elevate_house
    description: "Elevate"
    preconditions:
      - field: funds
        at_least: 20000
"#;

    fn registry() -> SkillRegistry {
        SkillRegistry::load_str(REGISTRY).unwrap()
    }

    fn agent() -> AgentSnapshot {
        AgentSnapshot::new("hh_1", "household")
            .with_state("insured", json!(false))
            .with_state("funds", json!(5000.0))
            .with_state("elevated", json!(false))
    }

    fn rule(condition: &str) -> GovernanceRule {
        GovernanceRule {
            id: "high_threat_no_do_nothing".into(),
            family: ValidatorFamily::Thinking,
            severity: Severity::Error,
            condition: condition.into(),
            blocked_skill: Some("do_nothing".into()),
            reason: "threat is too high for {skill}".into(),
            suggest: vec![],
            priority: 0,
        }
    }

    #[test]
    fn test_rule_fires_on_construct_match() {
        let registry = registry();
        let agent = agent();
        let ctx = ValidationContext::new(&agent, 1, &registry);
        let validator = ConfiguredRuleValidator::new(rule(r#"TP == "VH""#));

        let proposal = SkillProposal::new("hh_1", "do_nothing")
            .with_construct("TP", OrdinalLabel::VeryHigh);
        let results = validator.validate(&proposal, &ctx).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_blocking());
        assert_eq!(results[0].reason, "threat is too high for do_nothing");
        // fallback never suggested as an alternative
        assert_eq!(results[0].alternatives, vec!["buy_insurance"]);
    }

    #[test]
    fn test_rule_skips_other_skills() {
        let registry = registry();
        let agent = agent();
        let ctx = ValidationContext::new(&agent, 1, &registry);
        let validator = ConfiguredRuleValidator::new(rule(r#"TP == "VH""#));

        let proposal = SkillProposal::new("hh_1", "buy_insurance")
            .with_construct("TP", OrdinalLabel::VeryHigh);
        assert!(validator.validate(&proposal, &ctx).unwrap().is_empty());
    }

    #[test]
    fn test_missing_construct_means_no_fire() {
        let registry = registry();
        let agent = agent();
        let ctx = ValidationContext::new(&agent, 1, &registry);
        let validator = ConfiguredRuleValidator::new(rule(r#"TP == "VH" && CP == "L""#));

        // proposal labels TP only; the partial-key rule must not fire
        let proposal = SkillProposal::new("hh_1", "do_nothing")
            .with_construct("TP", OrdinalLabel::VeryHigh);
        assert!(validator.validate(&proposal, &ctx).unwrap().is_empty());
    }

    #[test]
    fn test_state_fields_visible_to_conditions() {
        let registry = registry();
        let agent = agent();
        let ctx = ValidationContext::new(&agent, 1, &registry);
        let mut r = rule(r#"TP_rank >= 3 && insured == false"#);
        r.id = "high_threat_uninsured".into();
        let validator = ConfiguredRuleValidator::new(r);

        let proposal = SkillProposal::new("hh_1", "do_nothing")
            .with_construct("TP", OrdinalLabel::High);
        let results = validator.validate(&proposal, &ctx).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_broken_condition_is_fatal() {
        let registry = registry();
        let agent = agent();
        let ctx = ValidationContext::new(&agent, 1, &registry);
        let validator = ConfiguredRuleValidator::new(rule(r#"TP == "VH" &&"#));

        let proposal = SkillProposal::new("hh_1", "do_nothing")
            .with_construct("TP", OrdinalLabel::VeryHigh);
        assert!(matches!(
            validator.validate(&proposal, &ctx),
            Err(WagfError::RuleEvaluation { .. })
        ));
    }

    #[test]
    fn test_explicit_suggestions_win() {
        let registry = registry();
        let agent = agent();
        let ctx = ValidationContext::new(&agent, 1, &registry);
        let mut r = rule(r#"TP == "VH""#);
        r.suggest = vec!["buy_insurance".into(), "elevate_house".into()];
        let validator = ConfiguredRuleValidator::new(r);

        let proposal = SkillProposal::new("hh_1", "do_nothing")
            .with_construct("TP", OrdinalLabel::VeryHigh);
        let results = validator.validate(&proposal, &ctx).unwrap();
        assert_eq!(results[0].alternatives, vec!["buy_insurance", "elevate_house"]);
    }

    #[test]
    fn test_warning_severity() {
        let registry = registry();
        let agent = agent();
        let ctx = ValidationContext::new(&agent, 1, &registry);
        let mut r = rule(r#"TP == "L""#);
        r.severity = Severity::Warning;
        let validator = ConfiguredRuleValidator::new(r);

        let proposal = SkillProposal::new("hh_1", "do_nothing")
            .with_construct("TP", OrdinalLabel::Low);
        let results = validator.validate(&proposal, &ctx).unwrap();
        assert!(!results[0].is_blocking());
        assert!(results[0].valid);
    }

    #[test]
    fn test_rule_yaml() {
        let yaml = r#"
id: low_threat_no_relocate
family: thinking
severity: ERROR
condition: 'TP == "VL"'
blocked_skill: relocate
reason: "relocation is disproportionate at very low threat"
priority: 5
"#;
        let rule: GovernanceRule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.family, ValidatorFamily::Thinking);
        assert_eq!(rule.severity, Severity::Error);
        assert_eq!(rule.priority, 5);
    }
}
