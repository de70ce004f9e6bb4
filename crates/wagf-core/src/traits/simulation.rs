//! Contract the runner needs from a domain simulation
//!
//! Concrete engines (flood hydrology, irrigation mass balance) are external
//! collaborators; the core only steps the clock, reads snapshots and commits
//! approved effects.

use crate::agent::{AgentSnapshot, EnvironmentalState, SkillEffect};
use crate::error::Result;

pub trait SimulationEngine: Send {
    /// Step forward one tick and return the observable world state.
    fn advance_year(&mut self, year: u32) -> Result<EnvironmentalState>;

    /// Commit one approved state change. A rejection here is an effect
    /// error: fatal for the agent, logged, and optionally fatal for the run.
    fn apply_effect(&mut self, agent_id: &str, effect: &SkillEffect) -> Result<()>;

    /// Agents still in the live population, in stable id order.
    fn active_agents(&self) -> Vec<AgentSnapshot>;
}
