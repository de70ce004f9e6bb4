use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use wagf_core::{EnvironmentalState, InterventionReport, ReflectionInsight};

use crate::audit::RunSummary;

/// Extension points around the year loop. All default to no-ops.
#[async_trait]
pub trait ExperimentHooks: Send + Sync {
    /// After the simulation stepped, before any agent decides. Environmental
    /// memory injection happens here.
    async fn pre_year(&self, _year: u32, _environment: &EnvironmentalState) {}

    /// After one agent's decision was brokered and recorded.
    async fn post_step(&self, _report: &InterventionReport) {}

    /// After effects applied and batch reflection ran.
    async fn post_year(&self, _year: u32, _insights: &[(String, ReflectionInsight)]) {}

    /// After the last year, before audit files close.
    async fn finalize(&self, _summary: &RunSummary) {}
}

pub struct NoopHooks;

#[async_trait]
impl ExperimentHooks for NoopHooks {}

pub struct LoggingHooks;

#[async_trait]
impl ExperimentHooks for LoggingHooks {
    async fn pre_year(&self, year: u32, environment: &EnvironmentalState) {
        info!(
            year,
            news = environment.global_events.len(),
            notices = environment.institutional.len(),
            "year begins"
        );
    }

    async fn post_step(&self, report: &InterventionReport) {
        debug!(
            agent = %report.agent_id,
            year = report.year,
            outcome = report.outcome.as_str(),
            skill = %report.final_skill,
            attempts = report.attempt_count(),
            "decision recorded"
        );
    }

    async fn post_year(&self, year: u32, insights: &[(String, ReflectionInsight)]) {
        info!(year, insights = insights.len(), "year complete");
    }

    async fn finalize(&self, summary: &RunSummary) {
        info!(
            decisions = summary.decisions,
            invocations = summary.llm_invocations,
            wall_ms = summary.wall_time_ms,
            "experiment finished"
        );
    }
}

pub struct CompositeHooks {
    hooks: Vec<Arc<dyn ExperimentHooks>>,
}

impl CompositeHooks {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn add(mut self, hooks: Arc<dyn ExperimentHooks>) -> Self {
        self.hooks.push(hooks);
        self
    }
}

impl Default for CompositeHooks {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExperimentHooks for CompositeHooks {
    async fn pre_year(&self, year: u32, environment: &EnvironmentalState) {
        for hook in &self.hooks {
            hook.pre_year(year, environment).await;
        }
    }

    async fn post_step(&self, report: &InterventionReport) {
        for hook in &self.hooks {
            hook.post_step(report).await;
        }
    }

    async fn post_year(&self, year: u32, insights: &[(String, ReflectionInsight)]) {
        for hook in &self.hooks {
            hook.post_year(year, insights).await;
        }
    }

    async fn finalize(&self, summary: &RunSummary) {
        for hook in &self.hooks {
            hook.finalize(summary).await;
        }
    }
}
