use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use wagf_core::{AgentSnapshot, Result, WagfError};

use crate::definition::SkillDefinition;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryFile {
    skills: Vec<SkillDefinition>,
    default_skill: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DescribeFormat {
    /// `id: description`
    #[default]
    Short,
    /// Description plus cost and precondition lines, for prompt embedding.
    Detailed,
}

/// Source of truth for the discrete action set. Read-only after load.
pub struct SkillRegistry {
    skills: HashMap<String, SkillDefinition>,
    /// Declared order; eligibility listings are deterministic.
    order: Vec<String>,
    default_skill: String,
}

impl SkillRegistry {
    pub fn load_str(yaml: &str) -> Result<Self> {
        let file: RegistryFile = serde_yaml::from_str(yaml)?;
        Self::from_definitions(file.skills, file.default_skill)
    }

    pub fn load_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::load_str(&content)
    }

    pub fn from_definitions(
        definitions: Vec<SkillDefinition>,
        default_skill: String,
    ) -> Result<Self> {
        let mut skills = HashMap::new();
        let mut order = Vec::new();

        for def in definitions {
            def.validate()?;
            if skills.contains_key(&def.id) {
                return Err(WagfError::DuplicateSkill(def.id));
            }
            order.push(def.id.clone());
            skills.insert(def.id.clone(), def);
        }

        if !skills.contains_key(&default_skill) {
            return Err(WagfError::Config(format!(
                "default_skill '{default_skill}' is not a registered skill"
            )));
        }

        debug!(count = order.len(), default = %default_skill, "skill registry loaded");
        Ok(Self {
            skills,
            order,
            default_skill,
        })
    }

    pub fn lookup(&self, skill_id: &str) -> Option<&SkillDefinition> {
        self.skills.get(skill_id)
    }

    pub fn contains(&self, skill_id: &str) -> bool {
        self.skills.contains_key(skill_id)
    }

    /// The designated fallback skill id.
    pub fn default_skill(&self) -> &str {
        &self.default_skill
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// All skills in declared order.
    pub fn all(&self) -> impl Iterator<Item = &SkillDefinition> {
        self.order.iter().filter_map(|id| self.skills.get(id))
    }

    /// Skills this agent may attempt right now, in declared order: the agent
    /// type matches, completed one-time skills are filtered, and every
    /// precondition holds against the snapshot.
    pub fn eligible_for(&self, agent: &AgentSnapshot) -> Vec<&SkillDefinition> {
        self.all()
            .filter(|skill| skill.eligible_agent_type(&agent.agent_type))
            .filter(|skill| !skill.already_done(agent))
            .filter(|skill| skill.preconditions_hold(agent))
            .collect()
    }

    /// Eligible skill ids only.
    pub fn eligible_ids(&self, agent: &AgentSnapshot) -> Vec<String> {
        self.eligible_for(agent)
            .into_iter()
            .map(|s| s.id.clone())
            .collect()
    }

    pub fn describe(&self, skill_id: &str, format: DescribeFormat) -> Result<String> {
        let skill = self
            .lookup(skill_id)
            .ok_or_else(|| WagfError::UnknownSkill(skill_id.to_string()))?;

        Ok(match format {
            DescribeFormat::Short => format!("{}: {}", skill.id, skill.description),
            DescribeFormat::Detailed => {
                let mut lines = vec![format!("{}: {}", skill.id, skill.description)];
                if skill.cost > 0.0 {
                    lines.push(format!("  cost: {}", skill.cost));
                }
                for precondition in &skill.preconditions {
                    lines.push(format!("  requires: {}", precondition.describe()));
                }
                lines.join("\n")
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const REGISTRY_YAML: &str = r#"
default_skill: do_nothing
skills:
  - id: do_nothing
    description: "Take no protective action this year"
  - id: buy_insurance
    description: "Purchase flood insurance"
    agent_types: [household]
    preconditions:
      - field: insured
        equals: false
      - field: funds
        at_least: 500
    effects:
      - field: insured
        value: true
    cost: 500
  - id: elevate_house
    description: "Raise the structure above expected flood depth"
    agent_types: [household]
    preconditions:
      - field: elevated
        equals: false
      - field: funds
        at_least: 20000
    effects:
      - field: elevated
        value: true
    one_time: true
    done_when: elevated
    cost: 20000
  - id: maintain_demand
    description: "Keep water demand at current levels"
    agent_types: [irrigation_district]
"#;

    fn household() -> AgentSnapshot {
        AgentSnapshot::new("hh_1", "household")
            .with_state("elevated", json!(false))
            .with_state("insured", json!(false))
            .with_state("funds", json!(5000.0))
    }

    #[test]
    fn test_load_and_lookup() {
        let registry = SkillRegistry::load_str(REGISTRY_YAML).unwrap();
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.default_skill(), "do_nothing");
        assert!(registry.lookup("elevate_house").is_some());
        assert!(registry.lookup("relocate").is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let yaml = r#"
default_skill: a
skills:
  - id: a
    description: "first"
  - id: a
    description: "second"
"#;
        assert!(matches!(
            SkillRegistry::load_str(yaml),
            Err(WagfError::DuplicateSkill(_))
        ));
    }

    #[test]
    fn test_unknown_default_rejected() {
        let yaml = r#"
default_skill: missing
skills:
  - id: a
    description: "only"
"#;
        assert!(matches!(
            SkillRegistry::load_str(yaml),
            Err(WagfError::Config(_))
        ));
    }

    #[test]
    fn test_eligibility_order_and_filters() {
        let registry = SkillRegistry::load_str(REGISTRY_YAML).unwrap();

        // funds too low for elevation, so it drops out; declared order kept
        let ids = registry.eligible_ids(&household());
        assert_eq!(ids, vec!["do_nothing", "buy_insurance"]);

        // irrigation district sees its own actions plus untyped ones
        let district = AgentSnapshot::new("d_1", "irrigation_district");
        let ids = registry.eligible_ids(&district);
        assert_eq!(ids, vec!["do_nothing", "maintain_demand"]);
    }

    #[test]
    fn test_one_time_filtered_when_done() {
        let registry = SkillRegistry::load_str(REGISTRY_YAML).unwrap();
        let rich = AgentSnapshot::new("hh_2", "household")
            .with_state("elevated", json!(false))
            .with_state("insured", json!(false))
            .with_state("funds", json!(50000.0));
        assert!(registry.eligible_ids(&rich).contains(&"elevate_house".to_string()));

        let done = AgentSnapshot::new("hh_3", "household")
            .with_state("elevated", json!(true))
            .with_state("insured", json!(false))
            .with_state("funds", json!(50000.0));
        assert!(!registry.eligible_ids(&done).contains(&"elevate_house".to_string()));
    }

    #[test]
    fn test_describe_formats() {
        let registry = SkillRegistry::load_str(REGISTRY_YAML).unwrap();
        let short = registry.describe("buy_insurance", DescribeFormat::Short).unwrap();
        assert_eq!(short, "buy_insurance: Purchase flood insurance");

        let detailed = registry.describe("buy_insurance", DescribeFormat::Detailed).unwrap();
        assert!(detailed.contains("cost: 500"));
        assert!(detailed.contains("requires: insured must be false"));

        assert!(registry.describe("missing", DescribeFormat::Short).is_err());
    }
}
