//! Snapshots exchanged between the simulation and the broker
//!
//! The simulation owns agent state. The broker only ever sees an
//! `AgentSnapshot` and never writes through it; approved changes travel back
//! as `SkillEffect`s applied by the simulation itself.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// Read-only view of one agent at decision time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: String,
    pub agent_type: String,
    /// Domain state fields; the broker reads them as untyped JSON values.
    #[serde(default)]
    pub state: Map<String, Value>,
    /// Most recent decisions, newest last.
    #[serde(default)]
    pub recent_decisions: Vec<String>,
    /// Set when the agent left the live population (e.g. relocated).
    #[serde(default)]
    pub removed: bool,
}

impl AgentSnapshot {
    pub fn new(id: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent_type: agent_type.into(),
            state: Map::new(),
            recent_decisions: Vec::new(),
            removed: false,
        }
    }

    pub fn with_state(mut self, key: impl Into<String>, value: Value) -> Self {
        self.state.insert(key.into(), value);
        self
    }

    /// Boolean state field; absent or non-boolean reads as `false`.
    pub fn flag(&self, key: &str) -> bool {
        self.state.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.state.get(key).and_then(Value::as_f64)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.state.get(key).and_then(Value::as_str)
    }

    pub fn last_decision(&self) -> Option<&str> {
        self.recent_decisions.last().map(String::as_str)
    }

    /// Stable digest of the state map, recorded in the simulation log so a
    /// decision can be matched to the exact state it saw.
    pub fn state_digest(&self) -> String {
        let ordered: BTreeMap<&String, &Value> = self.state.iter().collect();
        let mut hasher = Sha256::new();
        for (key, value) in ordered {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.to_string().as_bytes());
            hasher.update(b";");
        }
        hex::encode(&hasher.finalize()[..8])
    }
}

/// Observable world state for one simulated year, produced by
/// `SimulationEngine::advance_year`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalState {
    pub year: u32,
    /// Global news items, most recent first.
    #[serde(default)]
    pub global_events: Vec<String>,
    /// Institutional notices (subsidies, zoning, insurance terms).
    #[serde(default)]
    pub institutional: Vec<String>,
    /// Per-agent spatial fields (e.g. local flood depth).
    #[serde(default)]
    pub spatial: HashMap<String, Value>,
    /// Aggregate observable metrics, ordered for stable rendering.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl EnvironmentalState {
    pub fn for_year(year: u32) -> Self {
        Self {
            year,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectOp {
    Set,
    Add,
}

/// A concrete state change produced by an approved skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillEffect {
    pub field: String,
    pub op: EffectOp,
    pub value: Value,
    #[serde(default)]
    pub cost: f64,
}

impl SkillEffect {
    pub fn set(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: EffectOp::Set,
            value,
            cost: 0.0,
        }
    }

    pub fn add(field: impl Into<String>, amount: f64) -> Self {
        Self {
            field: field.into(),
            op: EffectOp::Add,
            value: Value::from(amount),
            cost: 0.0,
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_accessors() {
        let agent = AgentSnapshot::new("hh_1", "household")
            .with_state("elevated", json!(false))
            .with_state("funds", json!(5000.0))
            .with_state("zone", json!("riverside"));

        assert!(!agent.flag("elevated"));
        assert!(!agent.flag("missing"));
        assert_eq!(agent.number("funds"), Some(5000.0));
        assert_eq!(agent.text("zone"), Some("riverside"));
    }

    #[test]
    fn test_state_digest_tracks_state() {
        let a = AgentSnapshot::new("hh_1", "household").with_state("elevated", json!(false));
        let b = AgentSnapshot::new("hh_1", "household").with_state("elevated", json!(true));
        let c = AgentSnapshot::new("hh_1", "household").with_state("elevated", json!(false));

        assert_ne!(a.state_digest(), b.state_digest());
        assert_eq!(a.state_digest(), c.state_digest());
    }

    #[test]
    fn test_digest_insertion_order_independent() {
        let a = AgentSnapshot::new("hh_1", "household")
            .with_state("elevated", json!(true))
            .with_state("funds", json!(100));
        let b = AgentSnapshot::new("hh_1", "household")
            .with_state("funds", json!(100))
            .with_state("elevated", json!(true));
        assert_eq!(a.state_digest(), b.state_digest());
    }

    #[test]
    fn test_effect_builders() {
        let effect = SkillEffect::set("insured", json!(true)).with_cost(500.0);
        assert_eq!(effect.op, EffectOp::Set);
        assert_eq!(effect.cost, 500.0);

        let effect = SkillEffect::add("funds", -500.0);
        assert_eq!(effect.op, EffectOp::Add);
    }
}
