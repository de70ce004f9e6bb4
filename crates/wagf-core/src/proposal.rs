use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::scale::OrdinalLabel;

/// Prompt/completion token tallies as reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub prompt: u32,
    pub completion: u32,
}

impl TokenCounts {
    pub fn new(prompt: u32, completion: u32) -> Self {
        Self { prompt, completion }
    }

    pub fn total(&self) -> u32 {
        self.prompt + self.completion
    }

    pub fn accumulate(&mut self, other: TokenCounts) {
        self.prompt += other.prompt;
        self.completion += other.completion;
    }
}

/// The model's candidate action plus its justification, as parsed by the
/// model adapter. `skill: None` marks an unparseable reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillProposal {
    pub agent_id: String,

    #[serde(default)]
    pub skill: Option<String>,

    #[serde(default)]
    pub reasoning: String,

    /// Construct name -> ordinal label, ordered for stable serialization.
    #[serde(default)]
    pub constructs: BTreeMap<String, OrdinalLabel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Verbatim model output, retained for the audit trail.
    #[serde(default)]
    pub raw_text: String,
}

impl SkillProposal {
    pub fn new(agent_id: impl Into<String>, skill: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            skill: Some(skill.into()),
            reasoning: String::new(),
            constructs: BTreeMap::new(),
            confidence: None,
            raw_text: String::new(),
        }
    }

    pub fn unparseable(agent_id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            skill: None,
            reasoning: String::new(),
            constructs: BTreeMap::new(),
            confidence: None,
            raw_text: raw_text.into(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn with_construct(mut self, name: impl Into<String>, label: OrdinalLabel) -> Self {
        self.constructs.insert(name.into(), label);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn with_raw_text(mut self, raw: impl Into<String>) -> Self {
        self.raw_text = raw.into();
        self
    }

    pub fn is_parseable(&self) -> bool {
        self.skill.is_some()
    }

    pub fn construct(&self, name: &str) -> Option<OrdinalLabel> {
        self.constructs.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_counts_accumulate() {
        let mut counts = TokenCounts::new(100, 20);
        counts.accumulate(TokenCounts::new(50, 10));
        assert_eq!(counts.prompt, 150);
        assert_eq!(counts.completion, 30);
        assert_eq!(counts.total(), 180);
    }

    #[test]
    fn test_proposal_builder() {
        let proposal = SkillProposal::new("hh_3", "buy_insurance")
            .with_construct("TP", OrdinalLabel::VeryHigh)
            .with_construct("CP", OrdinalLabel::High)
            .with_confidence(1.4);

        assert!(proposal.is_parseable());
        assert_eq!(proposal.construct("TP"), Some(OrdinalLabel::VeryHigh));
        assert_eq!(proposal.confidence, Some(1.0));
    }

    #[test]
    fn test_unparseable() {
        let proposal = SkillProposal::unparseable("hh_3", "maybe...?");
        assert!(!proposal.is_parseable());
        assert_eq!(proposal.raw_text, "maybe...?");
    }
}
