use serde::{Deserialize, Serialize};
use serde_json::Value;

use wagf_core::{AgentSnapshot, EffectOp, Result, SkillEffect, WagfError};

/// A named, typed action an agent may attempt. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDefinition {
    pub id: String,
    pub description: String,

    /// Agent types allowed to attempt this skill; empty means any.
    #[serde(default)]
    pub agent_types: Vec<String>,

    /// Pure predicates over the state snapshot; no side effects.
    #[serde(default)]
    pub preconditions: Vec<Precondition>,

    /// State fields this skill is allowed to write, and how.
    #[serde(default)]
    pub effects: Vec<EffectSpec>,

    #[serde(default)]
    pub one_time: bool,

    /// State flag marking a one-time skill as already performed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_when: Option<String>,

    #[serde(default)]
    pub cost: f64,
}

impl SkillDefinition {
    pub fn eligible_agent_type(&self, agent_type: &str) -> bool {
        self.agent_types.is_empty() || self.agent_types.iter().any(|t| t == agent_type)
    }

    /// One-time skill whose effect the state already shows.
    pub fn already_done(&self, agent: &AgentSnapshot) -> bool {
        self.one_time
            && self
                .done_when
                .as_deref()
                .map(|flag| agent.flag(flag))
                .unwrap_or(false)
    }

    pub fn preconditions_hold(&self, agent: &AgentSnapshot) -> bool {
        self.preconditions.iter().all(|p| p.holds(agent))
    }

    pub fn first_failed_precondition(&self, agent: &AgentSnapshot) -> Option<&Precondition> {
        self.preconditions.iter().find(|p| !p.holds(agent))
    }

    /// Concrete effects this skill produces when approved. The cost rides
    /// on the first effect only, so applying them charges it once.
    pub fn concrete_effects(&self) -> Vec<SkillEffect> {
        self.effects
            .iter()
            .enumerate()
            .map(|(index, spec)| spec.to_effect(if index == 0 { self.cost } else { 0.0 }))
            .collect()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(WagfError::Config("skill with empty id".into()));
        }
        for effect in &self.effects {
            effect.validate(&self.id)?;
        }
        if self.one_time && self.done_when.is_none() {
            return Err(WagfError::Config(format!(
                "one-time skill '{}' needs done_when to be filterable",
                self.id
            )));
        }
        Ok(())
    }
}

/// A precondition over one state field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Precondition {
    Equals { field: String, equals: bool },
    AtLeast { field: String, at_least: f64 },
    AtMost { field: String, at_most: f64 },
}

impl Precondition {
    pub fn holds(&self, agent: &AgentSnapshot) -> bool {
        match self {
            Precondition::Equals { field, equals } => agent.flag(field) == *equals,
            Precondition::AtLeast { field, at_least } => {
                agent.number(field).map(|v| v >= *at_least).unwrap_or(false)
            }
            Precondition::AtMost { field, at_most } => {
                agent.number(field).map(|v| v <= *at_most).unwrap_or(false)
            }
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Precondition::Equals { field, .. }
            | Precondition::AtLeast { field, .. }
            | Precondition::AtMost { field, .. } => field,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Precondition::Equals { field, equals } => format!("{field} must be {equals}"),
            Precondition::AtLeast { field, at_least } => format!("{field} must be at least {at_least}"),
            Precondition::AtMost { field, at_most } => format!("{field} must be at most {at_most}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    #[default]
    Set,
    Increase,
    Decrease,
}

/// Allowed write to one state field, with polarity and magnitude.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectSpec {
    pub field: String,
    #[serde(default)]
    pub polarity: Polarity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl EffectSpec {
    pub(crate) fn validate(&self, skill_id: &str) -> Result<()> {
        match self.polarity {
            Polarity::Set if self.value.is_none() => Err(WagfError::Config(format!(
                "effect on '{}' in skill '{}' sets no value",
                self.field, skill_id
            ))),
            Polarity::Increase | Polarity::Decrease if self.magnitude.is_none() => {
                Err(WagfError::Config(format!(
                    "effect on '{}' in skill '{}' has no magnitude",
                    self.field, skill_id
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn to_effect(&self, cost: f64) -> SkillEffect {
        let effect = match self.polarity {
            Polarity::Set => SkillEffect {
                field: self.field.clone(),
                op: EffectOp::Set,
                value: self.value.clone().unwrap_or(Value::Null),
                cost: 0.0,
            },
            Polarity::Increase => SkillEffect::add(self.field.as_str(), self.magnitude.unwrap_or(0.0)),
            Polarity::Decrease => SkillEffect::add(self.field.as_str(), -self.magnitude.unwrap_or(0.0)),
        };
        effect.with_cost(cost)
    }
}
