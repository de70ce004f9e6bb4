use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde_json::{Value, json};
use tracing::{error, info, warn};
use uuid::Uuid;

use wagf_context::ContextBuilder;
use wagf_core::{
    AgentSnapshot, EmotionTag, LlmInvoke, MemoryEngine, MemoryKind, MemoryMetadata, MemorySource,
    Result, SimulationEngine, WagfError,
};
use wagf_governance::{BrokerConfig, DecisionCache, SkillBroker, ValidatorChain};
use wagf_llm::ModelAdapter;
use wagf_memory::build_engine;
use wagf_reflection::{ReflectionConfig, ReflectionEngine};
use wagf_skills::SkillRegistry;

use crate::audit::{AuditSink, RunSummary};
use crate::config::{AgentTypesFile, ExperimentConfig};
use crate::hooks::{ExperimentHooks, NoopHooks};

/// How many recent decisions ride along on a snapshot.
const DECISION_HISTORY: usize = 3;

/// Wires registry, agent type configs and the injected LLM callable into a
/// runnable experiment. All config errors surface here, before any LLM call.
pub struct ExperimentBuilder {
    registry: Arc<SkillRegistry>,
    types: AgentTypesFile,
    llm: Arc<dyn LlmInvoke>,
    config: ExperimentConfig,
    hooks: Arc<dyn ExperimentHooks>,
}

impl ExperimentBuilder {
    pub fn new(
        registry: SkillRegistry,
        types: AgentTypesFile,
        llm: Arc<dyn LlmInvoke>,
        config: ExperimentConfig,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            types,
            llm,
            config,
            hooks: Arc::new(NoopHooks),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ExperimentHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn build<S: SimulationEngine>(self, simulation: S) -> Result<ExperimentRunner<S>> {
        self.validate()?;

        let global = &self.types.global_config;
        let memory = build_engine(&global.memory);

        let mut brokers = HashMap::new();
        for (type_name, type_config) in &self.types.agent_types {
            let adapter = ModelAdapter::new(
                Arc::clone(&self.llm),
                type_config.parsing.clone(),
                self.types.shared.response_format.clone(),
            )
            .with_timeout(Duration::from_secs(global.llm_timeout_secs));

            let fallback = type_config
                .fallback_skill
                .clone()
                .unwrap_or_else(|| self.registry.default_skill().to_string());
            let chain = ValidatorChain::standard(type_config.governance.rules.clone(), &fallback);

            let builder = ContextBuilder::new(
                type_config.prompt_template.clone(),
                self.types.shared.response_format.instructions.clone(),
                self.types.shared.token_budget.clone(),
                self.config.seed,
            )?;

            let broker_config = BrokerConfig {
                max_attempts: global
                    .max_attempts
                    .min(type_config.parsing.max_retries + 1),
                governance_mode: global.governance_mode,
                fallback_skill: type_config.fallback_skill.clone(),
                ..BrokerConfig::default()
            };

            let mut broker = SkillBroker::new(
                adapter,
                chain,
                Arc::clone(&self.registry),
                builder,
                Arc::clone(&memory),
                broker_config,
            );
            if global.cache_enabled {
                broker = broker.with_cache(DecisionCache::new());
            }
            brokers.insert(type_name.clone(), Arc::new(broker));
        }

        // one reflection engine; per-type question banks merge into it
        let mut reflection_config = ReflectionConfig::default();
        for (type_name, type_config) in &self.types.agent_types {
            if let Some(bank) = type_config.reflection_config.question_banks.get(type_name) {
                reflection_config
                    .question_banks
                    .insert(type_name.clone(), bank.clone());
            }
        }
        let reflection = ReflectionEngine::new(
            Arc::clone(&self.llm),
            Arc::clone(&memory),
            reflection_config,
            self.registry.default_skill(),
        );

        let audit = AuditSink::new(&self.config.output_dir)?;

        Ok(ExperimentRunner {
            simulation,
            brokers,
            memory,
            reflection,
            hooks: self.hooks,
            audit: Arc::new(audit),
            registry: self.registry,
            config: self.config,
            cancel: Arc::new(AtomicBool::new(false)),
            history: HashMap::new(),
        })
    }

    fn validate(&self) -> Result<()> {
        self.types.validate()?;

        for (type_name, type_config) in &self.types.agent_types {
            if let Some(fallback) = &type_config.fallback_skill {
                if !self.registry.contains(fallback) {
                    return Err(WagfError::Config(format!(
                        "agent type '{type_name}' falls back to unknown skill '{fallback}'"
                    )));
                }
            }
            for rule in &type_config.governance.rules {
                if let Some(blocked) = &rule.blocked_skill {
                    if !self.registry.contains(blocked) {
                        return Err(WagfError::Config(format!(
                            "rule '{}' blocks unknown skill '{blocked}'",
                            rule.id
                        )));
                    }
                }
                for suggested in &rule.suggest {
                    if !self.registry.contains(suggested) {
                        return Err(WagfError::Config(format!(
                            "rule '{}' suggests unknown skill '{suggested}'",
                            rule.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Drives years x agents through the broker, stages effects until the end
/// of each step, and triggers batch reflection at year end.
pub struct ExperimentRunner<S: SimulationEngine> {
    simulation: S,
    brokers: HashMap<String, Arc<SkillBroker>>,
    memory: Arc<dyn MemoryEngine>,
    reflection: ReflectionEngine,
    hooks: Arc<dyn ExperimentHooks>,
    audit: Arc<AuditSink>,
    registry: Arc<SkillRegistry>,
    config: ExperimentConfig,
    cancel: Arc<AtomicBool>,
    history: HashMap<String, Vec<String>>,
}

impl<S: SimulationEngine> ExperimentRunner<S> {
    /// External cancellation: setting the flag drains in-flight decisions
    /// and halts at the next boundary; audit files stay valid.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn audit(&self) -> &AuditSink {
        &self.audit
    }

    pub fn simulation(&self) -> &S {
        &self.simulation
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn snapshot_map(&self, agents: Vec<AgentSnapshot>) -> BTreeMap<String, AgentSnapshot> {
        agents
            .into_iter()
            .filter(|agent| !agent.removed)
            .map(|mut agent| {
                if let Some(history) = self.history.get(&agent.id) {
                    let start = history.len().saturating_sub(DECISION_HISTORY);
                    agent.recent_decisions = history[start..].to_vec();
                }
                (agent.id.clone(), agent)
            })
            .collect()
    }

    fn inject_event_memories(
        &self,
        current: &BTreeMap<String, AgentSnapshot>,
        environment: &wagf_core::EnvironmentalState,
        year: u32,
    ) -> Result<()> {
        for agent_id in current.keys() {
            let events = environment
                .spatial
                .get(agent_id)
                .and_then(|local| local.get("events"))
                .and_then(Value::as_array);
            if let Some(events) = events {
                for event in events.iter().filter_map(Value::as_str) {
                    self.memory.add(
                        agent_id,
                        event,
                        MemoryMetadata::new(year as u64, MemorySource::Personal, EmotionTag::Critical),
                    )?;
                }
            }
        }
        if let Some(news) = environment.global_events.first() {
            for agent_id in current.keys() {
                self.memory.add(
                    agent_id,
                    news,
                    MemoryMetadata::new(
                        year as u64,
                        MemorySource::Community,
                        EmotionTag::Observation,
                    ),
                )?;
            }
        }
        Ok(())
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        info!(run_id = %run_id, years = self.config.years, seed = self.config.seed, "experiment starting");

        self.audit.write_config_snapshot(&json!({
            "run_id": &run_id,
            "experiment": &self.config,
        }))?;

        let mut previous = self.snapshot_map(self.simulation.active_agents());
        let mut years_completed = 0;

        for year in 1..=self.config.years {
            if self.cancelled() {
                warn!(year, "cancellation requested, halting before year");
                break;
            }

            let environment = self.simulation.advance_year(year)?;
            self.hooks.pre_year(year, &environment).await;
            self.memory.tick(year as u64);

            let current = self.snapshot_map(self.simulation.active_agents());
            self.inject_event_memories(&current, &environment, year)?;

            // deterministic visit order: a seeded permutation per year
            let mut agents: Vec<AgentSnapshot> = current.values().cloned().collect();
            let mut rng = StdRng::seed_from_u64(self.config.seed ^ u64::from(year));
            agents.shuffle(&mut rng);

            // decisions run against previous-year neighbor snapshots;
            // effects are staged and applied only after every agent decided
            let mut decided = Vec::new();
            for chunk in agents.chunks(self.config.workers.max(1)) {
                if self.cancelled() {
                    warn!(year, "cancellation requested, draining current step");
                    break;
                }

                let mut pending = Vec::new();
                for agent in chunk {
                    let broker = self
                        .brokers
                        .get(&agent.agent_type)
                        .ok_or_else(|| WagfError::UnknownAgentType(agent.agent_type.clone()))?;
                    let broker = Arc::clone(broker);
                    let neighbors: Vec<AgentSnapshot> = previous
                        .values()
                        .filter(|n| n.id != agent.id)
                        .cloned()
                        .collect();
                    let agent = agent.clone();
                    let environment = &environment;
                    pending.push(async move {
                        let report = broker.decide(&agent, year, environment, &neighbors).await;
                        (agent, report)
                    });
                }

                for (agent, report) in futures::future::join_all(pending).await {
                    let report = report?;
                    let cost = self
                        .registry
                        .lookup(&report.final_skill)
                        .map(|s| s.cost)
                        .unwrap_or(0.0);
                    self.audit
                        .record_decision(&report, &agent.state_digest(), cost)?;
                    self.hooks.post_step(&report).await;
                    decided.push((agent, report));
                }
            }

            // end-of-step: commit effects serially so iteration order never
            // leaks between agents
            for (agent, report) in &decided {
                self.history
                    .entry(agent.id.clone())
                    .or_default()
                    .push(report.final_skill.clone());

                let emotion = if report.final_skill == self.registry.default_skill() {
                    EmotionTag::Routine
                } else {
                    EmotionTag::Major
                };
                self.memory.add(
                    &agent.id,
                    &format!("In year {year} you decided to {}", report.final_skill),
                    MemoryMetadata::new(year as u64, MemorySource::Personal, emotion)
                        .with_kind(MemoryKind::Resolution),
                )?;

                let Some(skill) = self.registry.lookup(&report.final_skill) else {
                    continue;
                };
                for effect in skill.concrete_effects() {
                    if let Err(effect_error) = self.simulation.apply_effect(&agent.id, &effect) {
                        error!(
                            agent = %agent.id,
                            year,
                            skill = %report.final_skill,
                            %effect_error,
                            "simulation rejected an approved effect"
                        );
                        self.audit.record_effect_error();
                        if self.config.strict_effects {
                            return Err(effect_error);
                        }
                        break;
                    }
                }
            }

            // end-of-year batch reflection over the post-effect population
            let after_effects = self.snapshot_map(self.simulation.active_agents());
            let mut batch = Vec::new();
            for agent in after_effects.values() {
                if self.reflection.should_reflect(&agent.id, year) {
                    batch.push(self.reflection.extract_agent_context(agent, year, &environment));
                }
            }
            let insights = self.reflection.reflect_batch(&batch, year).await?;
            for (agent_id, insight) in &insights {
                self.audit.record_reflection(agent_id, insight)?;
            }
            self.hooks.post_year(year, &insights).await;

            previous = after_effects;
            years_completed = year;

            if self.cancelled() {
                break;
            }
        }

        let cache_hit_ratio = {
            let ratios: Vec<f64> = self
                .brokers
                .values()
                .filter_map(|b| b.cache().map(DecisionCache::hit_ratio))
                .collect();
            if ratios.is_empty() {
                0.0
            } else {
                ratios.iter().sum::<f64>() / ratios.len() as f64
            }
        };

        let summary = self.audit.build_summary(
            run_id,
            self.config.seed,
            years_completed,
            cache_hit_ratio,
            started.elapsed().as_millis() as u64,
        );
        self.audit.write_summary(&summary)?;
        self.hooks.finalize(&summary).await;
        self.audit.finalize()?;
        info!(
            decisions = summary.decisions,
            invocations = summary.llm_invocations,
            "experiment complete"
        );
        Ok(summary)
    }
}
