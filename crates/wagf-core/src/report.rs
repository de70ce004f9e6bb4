use serde::{Deserialize, Serialize};

use crate::proposal::{SkillProposal, TokenCounts};
use crate::validation::ValidationResult;

/// Terminal state of a brokered decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    ApprovedFirst,
    ApprovedRetry,
    RejectedFallback,
    Unparseable,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::ApprovedFirst => "APPROVED_FIRST",
            Outcome::ApprovedRetry => "APPROVED_RETRY",
            Outcome::RejectedFallback => "REJECTED_FALLBACK",
            Outcome::Unparseable => "UNPARSEABLE",
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Outcome::ApprovedFirst | Outcome::ApprovedRetry)
    }
}

/// One attempt within a decision: the proposal that round and every
/// validation result it drew.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionAttempt {
    pub index: u32,
    pub proposal: SkillProposal,
    #[serde(default)]
    pub results: Vec<ValidationResult>,
    /// The exact prompt this attempt was asked with, so the prompt stream
    /// is reproducible from the audit alone.
    #[serde(default)]
    pub prompt: String,
}

impl DecisionAttempt {
    pub fn blocking_results(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| r.is_blocking())
    }
}

/// Full audit record for a single (agent, year) decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionReport {
    pub agent_id: String,
    pub agent_type: String,
    pub year: u32,
    pub attempts: Vec<DecisionAttempt>,
    pub outcome: Outcome,
    /// The approved skill, or the configured fallback on rejection.
    pub final_skill: String,
    pub elapsed_ms: u64,
    pub tokens: TokenCounts,
    /// Served from the efficiency cache; no LLM invocation happened.
    #[serde(default)]
    pub from_cache: bool,
}

impl InterventionReport {
    pub fn initial_proposal(&self) -> Option<&SkillProposal> {
        self.attempts.first().map(|a| &a.proposal)
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// Ids of every ERROR-severity rule that fired across all attempts.
    pub fn blocking_rule_ids(&self) -> Vec<&str> {
        self.attempts
            .iter()
            .flat_map(|a| a.blocking_results())
            .map(|r| r.rule_id.as_str())
            .collect()
    }
}
