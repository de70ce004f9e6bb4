use serde::{Deserialize, Serialize};
use serde_json::Value;

use wagf_core::{AgentSnapshot, EnvironmentalState};

/// Everything the reflection prompt and the importance formula need to know
/// about one agent at year end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReflectionContext {
    pub agent_id: String,
    pub agent_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub year: u32,
    /// How many hazard events this agent has lived through in total.
    pub event_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_decision: Option<String>,
    pub had_major_action: bool,
    pub marginalized: bool,
    /// No hazard events reached this agent this year.
    pub stable_year: bool,
    /// One-line identity summary embedded in the prompt.
    pub state_summary: String,
    /// Recent memories quoted into the prompt.
    #[serde(default)]
    pub recent_memories: Vec<String>,
}

impl AgentReflectionContext {
    /// Derive the context from the agent snapshot and this year's
    /// environment. `fallback_skill` distinguishes a major action from
    /// standing still.
    pub fn extract(
        agent: &AgentSnapshot,
        year: u32,
        environment: &EnvironmentalState,
        fallback_skill: &str,
    ) -> Self {
        let event_count = agent
            .number("flood_count")
            .or_else(|| agent.number("event_count"))
            .unwrap_or(0.0) as u32;

        let recent_decision = agent.last_decision().map(str::to_string);
        let had_major_action = recent_decision
            .as_deref()
            .map(|d| d != fallback_skill)
            .unwrap_or(false);

        let stable_year = environment
            .spatial
            .get(&agent.id)
            .and_then(|local| local.get("events"))
            .and_then(Value::as_array)
            .map(|events| events.is_empty())
            .unwrap_or(true);

        let mut summary_parts = Vec::new();
        if agent.flag("elevated") {
            summary_parts.push("elevated home".to_string());
        }
        if agent.flag("insured") {
            summary_parts.push("insured".to_string());
        }
        if event_count > 0 {
            summary_parts.push(format!("{event_count} hazard events so far"));
        }
        if agent.flag("marginalized") {
            summary_parts.push("marginalized".to_string());
        }
        if let Some(decision) = &recent_decision {
            summary_parts.push(format!("last decision: {decision}"));
        }
        let state_summary = if summary_parts.is_empty() {
            "no notable state".to_string()
        } else {
            summary_parts.join(", ")
        };

        Self {
            agent_id: agent.id.clone(),
            agent_type: agent.agent_type.clone(),
            name: agent.text("name").map(str::to_string),
            year,
            event_count,
            recent_decision,
            had_major_action,
            marginalized: agent.flag("marginalized"),
            stable_year,
            state_summary,
            recent_memories: Vec::new(),
        }
    }

    pub fn with_memories(mut self, memories: Vec<String>) -> Self {
        self.recent_memories = memories;
        self
    }

    /// Construct-context line recorded on the stored insight.
    pub fn construct_context(&self) -> String {
        format!(
            "year {} / events {} / {}",
            self.year,
            self.event_count,
            self.recent_decision.as_deref().unwrap_or("no decision")
        )
    }
}
