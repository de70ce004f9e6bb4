use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use wagf_context::{ContextBuilder, ContextRequest, anchor_constructs};
use wagf_core::{
    AgentSnapshot, DecisionAttempt, EnvironmentalState, InterventionReport, MemoryEngine, Outcome,
    Result, TokenCounts, ValidationResult,
};
use wagf_llm::ModelAdapter;
use wagf_skills::{DescribeFormat, SkillRegistry};

use crate::cache::{CachedDecision, DecisionCache};
use crate::chain::ValidatorChain;
use crate::rules::{GovernanceMode, ValidatorFamily};
use crate::validator::ValidationContext;

fn default_max_attempts() -> u32 {
    3
}

fn default_memory_top_k() -> usize {
    10
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Initial attempt plus retries; 3 means up to two re-prompts.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub governance_mode: GovernanceMode,

    /// Per-agent-type fallback; the registry default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_skill: Option<String>,

    #[serde(default = "default_memory_top_k")]
    pub memory_top_k: usize,

    /// Use per-source slot allocation instead of plain top-k retrieval.
    #[serde(default = "default_true")]
    pub stratified_memory: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            governance_mode: GovernanceMode::default(),
            fallback_skill: None,
            memory_top_k: default_memory_top_k(),
            stratified_memory: true,
        }
    }
}

/// The decision loop: parse -> validate -> (retry | approve | fallback).
/// Every call to `decide` produces exactly one intervention report.
pub struct SkillBroker {
    adapter: ModelAdapter,
    chain: ValidatorChain,
    registry: Arc<SkillRegistry>,
    builder: ContextBuilder,
    memory: Arc<dyn MemoryEngine>,
    cache: Option<DecisionCache>,
    config: BrokerConfig,
}

impl SkillBroker {
    pub fn new(
        adapter: ModelAdapter,
        chain: ValidatorChain,
        registry: Arc<SkillRegistry>,
        builder: ContextBuilder,
        memory: Arc<dyn MemoryEngine>,
        config: BrokerConfig,
    ) -> Self {
        Self {
            adapter,
            chain,
            registry,
            builder,
            memory,
            cache: None,
            config,
        }
    }

    pub fn with_cache(mut self, cache: DecisionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&DecisionCache> {
        self.cache.as_ref()
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    fn fallback_for(&self) -> String {
        self.config
            .fallback_skill
            .clone()
            .unwrap_or_else(|| self.registry.default_skill().to_string())
    }

    fn base_request(
        &self,
        agent: &AgentSnapshot,
        year: u32,
        environment: &EnvironmentalState,
        neighbors: &[AgentSnapshot],
    ) -> ContextRequest {
        let memories = if self.config.stratified_memory {
            self.memory
                .retrieve_stratified(&agent.id, None, self.config.memory_top_k)
        } else {
            self.memory.retrieve(&agent.id, self.config.memory_top_k, None)
        };

        let skills: Vec<(String, String)> = self
            .registry
            .eligible_for(agent)
            .into_iter()
            .map(|skill| {
                let presentation = self
                    .registry
                    .describe(&skill.id, DescribeFormat::Detailed)
                    .unwrap_or_else(|_| format!("{}: {}", skill.id, skill.description));
                (skill.id.clone(), presentation)
            })
            .collect();

        ContextRequest::new(agent.clone(), year, environment.clone())
            .with_neighbors(neighbors.to_vec())
            .with_memories(memories)
            .with_skills(skills)
    }

    /// The fingerprint `decide` would use for this decision; exposed so
    /// cache behavior can be exercised deterministically.
    pub fn probe_fingerprint(
        &self,
        agent: &AgentSnapshot,
        year: u32,
        environment: &EnvironmentalState,
        neighbors: &[AgentSnapshot],
    ) -> Result<u64> {
        let built = self
            .builder
            .build(&self.base_request(agent, year, environment, neighbors))?;
        Ok(DecisionCache::fingerprint(&agent.state_digest(), &built.prompt))
    }

    pub async fn decide(
        &self,
        agent: &AgentSnapshot,
        year: u32,
        environment: &EnvironmentalState,
        neighbors: &[AgentSnapshot],
    ) -> Result<InterventionReport> {
        let started = Instant::now();
        let mut tokens = TokenCounts::default();
        let fallback = self.fallback_for();

        let base_request = self.base_request(agent, year, environment, neighbors);
        let vctx = ValidationContext::new(agent, year, &self.registry)
            .with_neighbors(neighbors)
            .with_fallback(&fallback)
            .with_institutional_context(!environment.institutional.is_empty());

        let first_built = self.builder.build(&base_request)?;
        let fingerprint = DecisionCache::fingerprint(&agent.state_digest(), &first_built.prompt);

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(fingerprint) {
                // replay identity rules against the current state; a stale
                // entry is dropped silently and the full pipeline runs
                let replay =
                    self.chain
                        .run_family(ValidatorFamily::Physical, &cached.proposal, &vctx)?;
                if replay.iter().any(ValidationResult::is_blocking) {
                    debug!(agent = %agent.id, year, "stale cache entry invalidated");
                    cache.invalidate(fingerprint);
                } else {
                    debug!(agent = %agent.id, year, "decision served from cache");
                    return Ok(InterventionReport {
                        agent_id: agent.id.clone(),
                        agent_type: agent.agent_type.clone(),
                        year,
                        attempts: vec![DecisionAttempt {
                            index: 1,
                            proposal: cached.proposal,
                            results: Vec::new(),
                            prompt: first_built.prompt,
                        }],
                        outcome: Outcome::ApprovedFirst,
                        final_skill: cached.final_skill,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                        tokens,
                        from_cache: true,
                    });
                }
            }
        }

        let mut attempts: Vec<DecisionAttempt> = Vec::new();
        let mut feedback: Option<String> = None;

        for attempt in 1..=self.config.max_attempts.max(1) {
            let built = if attempt == 1 {
                first_built.clone()
            } else {
                let mut request = base_request.clone();
                request.feedback = feedback.clone();
                self.builder.build(&request)?
            };

            let (proposal, attempt_tokens) = self
                .adapter
                .propose(&agent.id, &built.prompt, &built.presented_skills)
                .await;
            tokens.accumulate(attempt_tokens);

            if !proposal.is_parseable() {
                attempts.push(DecisionAttempt {
                    index: attempt,
                    proposal,
                    results: Vec::new(),
                    prompt: built.prompt,
                });
                feedback = Some(parse_failure_feedback());
                continue;
            }

            let results = match self.config.governance_mode {
                // disabled governance still enforces physical reality
                GovernanceMode::Disabled => {
                    self.chain
                        .run_family(ValidatorFamily::Physical, &proposal, &vctx)?
                }
                GovernanceMode::Strict => self.chain.run(&proposal, &vctx)?,
            };

            let blocked: Vec<ValidationResult> = results
                .iter()
                .filter(|r| r.is_blocking())
                .cloned()
                .collect();

            if blocked.is_empty() {
                let final_skill = proposal
                    .skill
                    .clone()
                    .unwrap_or_else(|| fallback.clone());
                attempts.push(DecisionAttempt {
                    index: attempt,
                    proposal,
                    results,
                    prompt: built.prompt,
                });

                if let Some(cache) = &self.cache {
                    cache.insert(
                        fingerprint,
                        CachedDecision {
                            proposal: attempts[attempts.len() - 1].proposal.clone(),
                            final_skill: final_skill.clone(),
                        },
                    );
                }

                let outcome = if attempt == 1 {
                    Outcome::ApprovedFirst
                } else {
                    Outcome::ApprovedRetry
                };
                info!(agent = %agent.id, year, skill = %final_skill, outcome = outcome.as_str(), "decision approved");
                return Ok(InterventionReport {
                    agent_id: agent.id.clone(),
                    agent_type: agent.agent_type.clone(),
                    year,
                    attempts,
                    outcome,
                    final_skill,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    tokens,
                    from_cache: false,
                });
            }

            feedback = Some(governance_feedback(&blocked, &proposal, &vctx));
            attempts.push(DecisionAttempt {
                index: attempt,
                proposal,
                results,
                prompt: built.prompt,
            });
        }

        // retries exhausted; the designated fallback is executed as if it
        // were the approved action
        let all_unparseable = attempts.iter().all(|a| !a.proposal.is_parseable());
        let outcome = if all_unparseable && self.config.max_attempts <= 1 {
            Outcome::Unparseable
        } else {
            Outcome::RejectedFallback
        };
        info!(agent = %agent.id, year, outcome = outcome.as_str(), fallback = %fallback, "decision fell back");

        Ok(InterventionReport {
            agent_id: agent.id.clone(),
            agent_type: agent.agent_type.clone(),
            year,
            attempts,
            outcome,
            final_skill: fallback,
            elapsed_ms: started.elapsed().as_millis() as u64,
            tokens,
            from_cache: false,
        })
    }
}

fn parse_failure_feedback() -> String {
    "GOVERNANCE FEEDBACK:\nThe previous reply could not be understood. \
     Reply using the exact response format shown below."
        .to_string()
}

/// Declarative, never prescriptive: small models treat suggestions as
/// directives, so the feedback names what happened and what remains valid
/// without telling the agent what to pick.
fn governance_feedback(
    blocked: &[ValidationResult],
    proposal: &wagf_core::SkillProposal,
    ctx: &ValidationContext<'_>,
) -> String {
    let mut lines = vec![
        "GOVERNANCE FEEDBACK:".to_string(),
        "The previous choice was not possible:".to_string(),
    ];
    for result in blocked {
        lines.push(format!("- rule {}: {}", result.rule_id, result.reason));
    }
    if !proposal.constructs.is_empty() {
        lines.push(format!(
            "Your stated assessment was: {}.",
            anchor_constructs(&proposal.constructs)
        ));
    }

    let mut remaining: Vec<String> = Vec::new();
    for result in blocked {
        for alternative in &result.alternatives {
            if !remaining.contains(alternative) {
                remaining.push(alternative.clone());
            }
        }
    }
    if remaining.is_empty() {
        remaining.push(ctx.fallback_skill.to_string());
    }
    lines.push(format!(
        "The following actions remain valid: {}.",
        remaining.join(", ")
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wagf_context::TokenBudget;
    use wagf_core::{OrdinalLabel, Severity, SkillProposal};
    use wagf_llm::{MockLlm, ParsingConfig, ResponseFormat};
    use wagf_memory::{MemoryConfig, build_engine};

    use crate::rules::GovernanceRule;

    const REGISTRY: &str = r#"
default_skill: do_nothing
skills:
  - id: do_nothing
    description: "Take no protective action this year"
  - id: buy_insurance
    description: "Purchase flood insurance"
    preconditions:
      - field: insured
        equals: false
    effects:
      - field: insured
        value: true
    cost: 500
  - id: elevate_house
    description: "Raise the structure above expected flood depth"
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
"#;

    fn thinking_rules() -> Vec<GovernanceRule> {
        vec![GovernanceRule {
            id: "high_threat_no_do_nothing".into(),
            family: ValidatorFamily::Thinking,
            severity: Severity::Error,
            condition: r#"TP == "VH""#.into(),
            blocked_skill: Some("do_nothing".into()),
            reason: "threat perception is too high to stand still".into(),
            suggest: vec![],
            priority: 0,
        }]
    }

    fn household(elevated: bool) -> AgentSnapshot {
        AgentSnapshot::new("hh_1", "household")
            .with_state("elevated", json!(elevated))
            .with_state("insured", json!(false))
            .with_state("funds", json!(5000.0))
    }

    fn broker_with(llm: MockLlm, max_attempts: u32) -> SkillBroker {
        let registry = Arc::new(SkillRegistry::load_str(REGISTRY).unwrap());
        let adapter = ModelAdapter::new(
            Arc::new(llm),
            ParsingConfig::default(),
            ResponseFormat::default(),
        );
        let chain = ValidatorChain::standard(thinking_rules(), "do_nothing");
        let builder = ContextBuilder::new(
            "You are {{ agent.id }}, a household deciding about flood protection.",
            ResponseFormat::default().instructions,
            TokenBudget::default(),
            7,
        )
        .unwrap();
        let memory = build_engine(&MemoryConfig::default());
        SkillBroker::new(
            adapter,
            chain,
            registry,
            builder,
            memory,
            BrokerConfig {
                max_attempts,
                ..BrokerConfig::default()
            },
        )
    }

    fn reply(skill: &str, tp: &str, cp: &str) -> String {
        format!(
            r#"<<<DECISION>>>{{"decision": "{skill}", "reasoning": "considered the risk", "TP": "{tp}", "CP": "{cp}"}}<<<END>>>"#
        )
    }

    #[tokio::test]
    async fn test_thinking_block_then_successful_retry() {
        let llm = MockLlm::new("mock").with_responses([
            reply("do_nothing", "VH", "H"),
            reply("buy_insurance", "VH", "H"),
        ]);
        let prompts_handle = llm.clone();
        let broker = broker_with(llm, 3);

        let report = broker
            .decide(&household(false), 1, &EnvironmentalState::for_year(1), &[])
            .await
            .unwrap();

        assert_eq!(report.outcome, Outcome::ApprovedRetry);
        assert_eq!(report.final_skill, "buy_insurance");
        assert_eq!(report.attempt_count(), 2);
        assert_eq!(report.blocking_rule_ids(), vec!["high_threat_no_do_nothing"]);
        assert_eq!(
            report.initial_proposal().and_then(|p| p.skill.as_deref()),
            Some("do_nothing")
        );

        // the re-prompt names the rule and lists the remaining option,
        // declaratively
        let reprompt = prompts_handle.prompts()[1].clone();
        assert!(reprompt.contains("high_threat_no_do_nothing"));
        assert!(reprompt.contains("The following actions remain valid: buy_insurance."));
        // the rejected assessment is echoed with semantic anchoring
        assert!(reprompt.contains("TP=VH (Very High)"));
    }

    #[tokio::test]
    async fn test_identity_block_exhausts_to_fallback() {
        let llm = MockLlm::new("mock").with_response(reply("elevate_house", "VH", "H"));
        let broker = broker_with(llm, 3);

        let agent = AgentSnapshot::new("hh_1", "household")
            .with_state("elevated", json!(true))
            .with_state("insured", json!(false))
            .with_state("funds", json!(50000.0));
        let report = broker
            .decide(&agent, 2, &EnvironmentalState::for_year(2), &[])
            .await
            .unwrap();

        assert_eq!(report.outcome, Outcome::RejectedFallback);
        assert_eq!(report.final_skill, "do_nothing");
        assert_eq!(report.attempt_count(), 3);
        assert!(report.blocking_rule_ids().iter().all(|id| *id == "already_elevated"));
    }

    #[tokio::test]
    async fn test_unparseable_reply_exhausts_to_fallback() {
        let llm = MockLlm::new("mock").with_response("maybe...?");
        let prompts_handle = llm.clone();
        let broker = broker_with(llm, 3);

        let report = broker
            .decide(&household(false), 1, &EnvironmentalState::for_year(1), &[])
            .await
            .unwrap();

        assert_eq!(report.outcome, Outcome::RejectedFallback);
        assert_eq!(report.final_skill, "do_nothing");
        assert_eq!(report.attempt_count(), 3);
        assert!(report.attempts.iter().all(|a| !a.proposal.is_parseable()));
        assert!(prompts_handle.prompts()[1].contains("could not be understood"));
    }

    #[tokio::test]
    async fn test_single_attempt_validation_error_is_rejected_fallback() {
        let llm = MockLlm::new("mock").with_response(reply("do_nothing", "VH", "H"));
        let broker = broker_with(llm, 1);

        let report = broker
            .decide(&household(false), 1, &EnvironmentalState::for_year(1), &[])
            .await
            .unwrap();

        assert_eq!(report.outcome, Outcome::RejectedFallback);
        assert_eq!(report.attempt_count(), 1);
    }

    #[tokio::test]
    async fn test_single_attempt_parse_failure_is_unparseable() {
        let llm = MockLlm::new("mock").with_response("???");
        let broker = broker_with(llm, 1);

        let report = broker
            .decide(&household(false), 1, &EnvironmentalState::for_year(1), &[])
            .await
            .unwrap();

        assert_eq!(report.outcome, Outcome::Unparseable);
        assert_eq!(report.final_skill, "do_nothing");
    }

    #[tokio::test]
    async fn test_only_fallback_left_is_not_a_trap() {
        // insured and elevated: only do_nothing remains eligible; a valid
        // do_nothing proposal must pass rather than being coerced
        let llm = MockLlm::new("mock").with_response(reply("do_nothing", "L", "M"));
        let broker = broker_with(llm, 3);

        let agent = AgentSnapshot::new("hh_1", "household")
            .with_state("elevated", json!(true))
            .with_state("insured", json!(true))
            .with_state("funds", json!(100.0));
        let report = broker
            .decide(&agent, 1, &EnvironmentalState::for_year(1), &[])
            .await
            .unwrap();

        assert_eq!(report.outcome, Outcome::ApprovedFirst);
        assert_eq!(report.final_skill, "do_nothing");
    }

    #[tokio::test]
    async fn test_first_attempt_approval() {
        let llm = MockLlm::new("mock").with_response(reply("buy_insurance", "VH", "H"));
        let broker = broker_with(llm, 3);

        let report = broker
            .decide(&household(false), 1, &EnvironmentalState::for_year(1), &[])
            .await
            .unwrap();

        assert_eq!(report.outcome, Outcome::ApprovedFirst);
        assert_eq!(report.attempt_count(), 1);
        assert!(report.tokens.total() > 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_llm() {
        let llm = MockLlm::new("mock").with_response(reply("buy_insurance", "VH", "H"));
        let calls_handle = llm.clone();
        let broker = broker_with(llm, 3).with_cache(DecisionCache::new());

        let agent = household(false);
        let environment = EnvironmentalState::for_year(1);

        let first = broker.decide(&agent, 1, &environment, &[]).await.unwrap();
        assert_eq!(first.outcome, Outcome::ApprovedFirst);
        let calls_after_first = calls_handle.call_count();

        let second = broker.decide(&agent, 1, &environment, &[]).await.unwrap();
        assert_eq!(second.outcome, Outcome::ApprovedFirst);
        assert_eq!(second.final_skill, "buy_insurance");
        assert_eq!(calls_handle.call_count(), calls_after_first);
        assert!(broker.cache().unwrap().hit_ratio() > 0.0);
    }

    #[tokio::test]
    async fn test_stale_cache_entry_replay_invalidates() {
        // a colliding fingerprint hands the broker an approved elevation for
        // an agent that is already elevated; identity replay must catch it
        let llm = MockLlm::new("mock").with_response(reply("elevate_house", "VH", "H"));
        let broker = broker_with(llm, 3).with_cache(DecisionCache::new());

        let agent = AgentSnapshot::new("hh_1", "household")
            .with_state("elevated", json!(true))
            .with_state("insured", json!(false))
            .with_state("funds", json!(50000.0));
        let environment = EnvironmentalState::for_year(4);

        let fingerprint = broker.probe_fingerprint(&agent, 4, &environment, &[]).unwrap();
        broker.cache().unwrap().insert(
            fingerprint,
            CachedDecision {
                proposal: SkillProposal::new("hh_1", "elevate_house")
                    .with_construct("TP", OrdinalLabel::VeryHigh),
                final_skill: "elevate_house".into(),
            },
        );

        let report = broker.decide(&agent, 4, &environment, &[]).await.unwrap();
        assert_eq!(report.outcome, Outcome::RejectedFallback);
        assert_eq!(report.final_skill, "do_nothing");

        // the stale entry is gone: a re-query for the same key misses
        assert!(broker.cache().unwrap().get(fingerprint).is_none());
    }

    #[tokio::test]
    async fn test_governance_disabled_keeps_identity_rules() {
        let llm = MockLlm::new("mock").with_response(reply("do_nothing", "VH", "H"));
        let registry = Arc::new(SkillRegistry::load_str(REGISTRY).unwrap());
        let adapter = ModelAdapter::new(
            Arc::new(llm),
            ParsingConfig::default(),
            ResponseFormat::default(),
        );
        let chain = ValidatorChain::standard(thinking_rules(), "do_nothing");
        let builder = ContextBuilder::new(
            "prompt",
            ResponseFormat::default().instructions,
            TokenBudget::default(),
            7,
        )
        .unwrap();
        let memory = build_engine(&MemoryConfig::default());
        let broker = SkillBroker::new(
            adapter,
            chain,
            registry,
            builder,
            memory,
            BrokerConfig {
                governance_mode: GovernanceMode::Disabled,
                ..BrokerConfig::default()
            },
        );

        // with governance disabled the thinking rule does not block
        let report = broker
            .decide(&household(false), 1, &EnvironmentalState::for_year(1), &[])
            .await
            .unwrap();
        assert_eq!(report.outcome, Outcome::ApprovedFirst);
        assert_eq!(report.final_skill, "do_nothing");
    }

    #[tokio::test]
    async fn test_determinism_single_attempt() {
        let make = || {
            let llm = MockLlm::new("mock").with_response(reply("buy_insurance", "VH", "H"));
            broker_with(llm, 1)
        };
        let agent = household(false);
        let environment = EnvironmentalState::for_year(1);

        let a = make().decide(&agent, 1, &environment, &[]).await.unwrap();
        let b = make().decide(&agent, 1, &environment, &[]).await.unwrap();

        assert_eq!(a.outcome, b.outcome);
        assert_eq!(a.final_skill, b.final_skill);
        assert_eq!(a.attempts[0].proposal, b.attempts[0].proposal);
    }
}
