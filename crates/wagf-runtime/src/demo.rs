use serde_json::json;

use wagf_core::{
    AgentSnapshot, EffectOp, EnvironmentalState, Result, SimulationEngine, SkillEffect, WagfError,
};

/// Minimal built-in simulation for dry runs and tests: households with
/// funds, periodic floods, no hydrology. Real engines are injected by the
/// experiment host; this one only exercises the wiring.
pub struct DemoSimulation {
    agents: Vec<AgentSnapshot>,
    flood_every: u32,
    annual_income: f64,
}

impl DemoSimulation {
    pub fn households(count: usize, funds: f64) -> Self {
        let agents = (0..count)
            .map(|i| {
                AgentSnapshot::new(format!("hh_{}", i + 1), "household")
                    .with_state("elevated", json!(false))
                    .with_state("insured", json!(false))
                    .with_state("funds", json!(funds))
                    .with_state("flood_count", json!(0))
            })
            .collect();
        Self {
            agents,
            flood_every: 3,
            annual_income: 0.0,
        }
    }

    pub fn with_flood_every(mut self, years: u32) -> Self {
        self.flood_every = years;
        self
    }

    pub fn with_annual_income(mut self, income: f64) -> Self {
        self.annual_income = income;
        self
    }

    pub fn agent(&self, agent_id: &str) -> Option<&AgentSnapshot> {
        self.agents.iter().find(|a| a.id == agent_id)
    }

    fn is_flood_year(&self, year: u32) -> bool {
        self.flood_every > 0 && year % self.flood_every == 0
    }
}

impl SimulationEngine for DemoSimulation {
    fn advance_year(&mut self, year: u32) -> Result<EnvironmentalState> {
        let flood = self.is_flood_year(year);
        let mut environment = EnvironmentalState::for_year(year);

        if flood {
            environment
                .global_events
                .push(format!("Year {year}: the river crested above flood stage"));
            environment
                .institutional
                .push("Disaster assistance applications are open for 90 days".to_string());
        } else {
            environment
                .global_events
                .push(format!("Year {year}: a quiet season on the river"));
        }

        let mut insured = 0usize;
        for agent in &mut self.agents {
            if self.annual_income != 0.0 {
                let funds = agent.number("funds").unwrap_or(0.0) + self.annual_income;
                agent.state.insert("funds".into(), json!(funds));
            }

            let mut events: Vec<String> = Vec::new();
            if flood && !agent.flag("elevated") {
                let count = agent.number("flood_count").unwrap_or(0.0) + 1.0;
                agent.state.insert("flood_count".into(), json!(count));
                events.push("floodwater reached the property".to_string());
            }
            environment
                .spatial
                .insert(agent.id.clone(), json!({ "events": events }));

            if agent.flag("insured") {
                insured += 1;
            }
        }

        if !self.agents.is_empty() {
            environment.metrics.insert(
                "insured_share".to_string(),
                insured as f64 / self.agents.len() as f64,
            );
        }

        Ok(environment)
    }

    fn apply_effect(&mut self, agent_id: &str, effect: &SkillEffect) -> Result<()> {
        let agent = self
            .agents
            .iter_mut()
            .find(|a| a.id == agent_id)
            .ok_or_else(|| WagfError::EffectRejected {
                agent: agent_id.to_string(),
                message: "agent is not in the live population".into(),
            })?;

        if effect.cost > 0.0 {
            let funds = agent.number("funds").unwrap_or(0.0);
            if funds < effect.cost {
                return Err(WagfError::EffectRejected {
                    agent: agent_id.to_string(),
                    message: format!("cost {} exceeds funds {}", effect.cost, funds),
                });
            }
            agent.state.insert("funds".into(), json!(funds - effect.cost));
        }

        match effect.op {
            EffectOp::Set => {
                agent.state.insert(effect.field.clone(), effect.value.clone());
            }
            EffectOp::Add => {
                let delta = effect.value.as_f64().unwrap_or(0.0);
                let current = agent.number(&effect.field).unwrap_or(0.0);
                agent
                    .state
                    .insert(effect.field.clone(), json!(current + delta));
            }
        }
        Ok(())
    }

    fn active_agents(&self) -> Vec<AgentSnapshot> {
        self.agents.iter().filter(|a| !a.removed).cloned().collect()
    }
}
