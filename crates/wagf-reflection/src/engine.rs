use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use serde_json::json;
use tracing::{debug, warn};

use wagf_context::TemplateRenderer;
use wagf_core::{
    AgentSnapshot, EmotionTag, EnvironmentalState, LlmInvoke, MemoryEngine, MemoryKind,
    MemoryMetadata, MemorySource, ReflectionInsight, Result,
};

use crate::config::ReflectionConfig;
use crate::context::AgentReflectionContext;

const BASE_IMPORTANCE: f64 = 0.9;

const BATCH_TEMPLATE: &str = "\
It is the end of year {{ year }}. Reflect briefly for each agent below.

{% for a in batch %}AGENT {{ a.agent_id }} ({{ a.agent_type }}{% if a.name %}, {{ a.name }}{% endif %}): {{ a.state_summary }}
{% if a.recent_memories %}They remember:
{% for m in a.recent_memories %}- {{ m }}
{% endfor %}{% endif %}{% if a.questions %}Consider:
{% for q in a.questions %}- {{ q }}
{% endfor %}{% endif %}
{% endfor %}Reply with exactly one line per agent, in the form:
agent_id: insight (at most two sentences)";

/// End-of-year consolidation: one batched LLM call distills each agent's
/// episodic memories into an insight, stored back under the `reflection`
/// source tag at dynamic importance.
pub struct ReflectionEngine {
    llm: Arc<dyn LlmInvoke>,
    memory: Arc<dyn MemoryEngine>,
    renderer: TemplateRenderer,
    config: ReflectionConfig,
    fallback_skill: String,
    line: Regex,
}

impl ReflectionEngine {
    pub fn new(
        llm: Arc<dyn LlmInvoke>,
        memory: Arc<dyn MemoryEngine>,
        config: ReflectionConfig,
        fallback_skill: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            memory,
            renderer: TemplateRenderer::new(),
            config,
            fallback_skill: fallback_skill.into(),
            line: Regex::new(r"(?m)^\s*[-*]?\s*([A-Za-z0-9_.\-]+)\s*[:\-]\s*(.+?)\s*$")
                .expect("static regex"),
        }
    }

    pub fn config(&self) -> &ReflectionConfig {
        &self.config
    }

    /// An agent reflects when the cadence year arrives and it has anything
    /// to reflect over. Zero memories means no batch and no insight.
    pub fn should_reflect(&self, agent_id: &str, year: u32) -> bool {
        if !self.config.enabled || year == 0 || year % self.config.cadence_years != 0 {
            return false;
        }
        self.memory
            .retrieve(agent_id, self.config.min_memories, None)
            .len()
            >= self.config.min_memories
    }

    pub fn extract_agent_context(
        &self,
        agent: &AgentSnapshot,
        year: u32,
        environment: &EnvironmentalState,
    ) -> AgentReflectionContext {
        let memories = self
            .memory
            .retrieve(&agent.id, self.config.memories_per_agent, None);
        AgentReflectionContext::extract(agent, year, environment, &self.fallback_skill)
            .with_memories(memories)
    }

    pub fn generate_personalized_batch_prompt(
        &self,
        batch: &[AgentReflectionContext],
        year: u32,
    ) -> Result<String> {
        let entries: Vec<serde_json::Value> = batch
            .iter()
            .map(|ctx| {
                json!({
                    "agent_id": ctx.agent_id,
                    "agent_type": ctx.agent_type,
                    "name": ctx.name,
                    "state_summary": ctx.state_summary,
                    "recent_memories": ctx.recent_memories,
                    "questions": self.config.questions_for(&ctx.agent_type),
                })
            })
            .collect();

        let mut template_ctx = HashMap::new();
        template_ctx.insert("year".to_string(), json!(year));
        template_ctx.insert("batch".to_string(), json!(entries));
        self.renderer.render(BATCH_TEMPLATE, &template_ctx)
    }

    /// One `agent_id: insight` line per agent; unknown ids and malformed
    /// lines are ignored.
    pub fn parse_batch_reflection_response(
        &self,
        text: &str,
        ids: &[String],
        year: u32,
    ) -> HashMap<String, ReflectionInsight> {
        let mut insights = HashMap::new();
        for capture in self.line.captures_iter(text) {
            let id = capture[1].to_string();
            if !ids.contains(&id) || insights.contains_key(&id) {
                continue;
            }
            let summary = capture[2].trim().to_string();
            if summary.is_empty() {
                continue;
            }
            insights.insert(id, ReflectionInsight::new(summary, BASE_IMPORTANCE, year));
        }
        insights
    }

    /// Reflections stored at a flat importance dominate later retrieval, so
    /// the base is adjusted by what kind of year the agent actually had.
    pub fn compute_dynamic_importance(&self, ctx: &AgentReflectionContext) -> f64 {
        let mut importance = BASE_IMPORTANCE;
        if ctx.event_count == 1 {
            importance = 0.95;
        } else if ctx.event_count > 2 {
            importance = 0.75;
        }
        if ctx.had_major_action {
            importance = importance.max(0.80);
        }
        if ctx.marginalized {
            importance = importance.max(0.90);
        }
        if ctx.stable_year && ctx.recent_decision.as_deref() == Some(self.fallback_skill.as_str()) {
            importance = importance.min(0.60);
        }
        (importance.clamp(0.0, 1.0) * 100.0).round() / 100.0
    }

    pub fn store_insight(&self, agent_id: &str, insight: &ReflectionInsight) -> Result<()> {
        let meta = MemoryMetadata::new(
            insight.year_created as u64,
            MemorySource::Reflection,
            EmotionTag::Shift,
        )
        .with_kind(MemoryKind::Reflection)
        .with_importance(insight.importance);
        self.memory.add(agent_id, &insight.summary, meta)
    }

    /// Run one end-of-year batch: prompt, parse, score, store. LLM failure
    /// costs this year's insights, never the experiment.
    pub async fn reflect_batch(
        &self,
        batch: &[AgentReflectionContext],
        year: u32,
    ) -> Result<Vec<(String, ReflectionInsight)>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = self.generate_personalized_batch_prompt(batch, year)?;
        let reply = match self.llm.invoke(&prompt).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(year, %error, "reflection batch failed, skipping this year");
                return Ok(Vec::new());
            }
        };

        let ids: Vec<String> = batch.iter().map(|c| c.agent_id.clone()).collect();
        let mut parsed = self.parse_batch_reflection_response(&reply.text, &ids, year);

        let mut stored = Vec::new();
        for ctx in batch {
            let Some(mut insight) = parsed.remove(&ctx.agent_id) else {
                continue;
            };
            insight.importance = self.compute_dynamic_importance(ctx);
            insight.construct_context = Some(ctx.construct_context());
            self.store_insight(&ctx.agent_id, &insight)?;
            stored.push((ctx.agent_id.clone(), insight));
        }
        debug!(year, count = stored.len(), "reflection insights stored");
        Ok(stored)
    }
}
