use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use wagf_core::Result;

use crate::budget::{BudgetSection, HeuristicCounter, TokenBudget, TokenCounter};
use crate::provider::{
    AgentAttributesProvider, ContextProvider, ContextRequest, EnvironmentProvider, EventsProvider,
    FeedbackProvider, InstitutionalProvider, MemoryProvider, ObservableMetricsProvider,
    ResponseFormatProvider, SkillsProvider, SocialObservationProvider, SystemPromptProvider,
};

const TRUNCATION_MARKER: &str = "[context truncated]";
const GOSSIP_TRIM: usize = 3;
const NEWS_TRIM: usize = 2;

/// Deterministic per-decision seed from (experiment seed, agent id, year).
/// FNV-1a so the permutation is reproducible across runs and platforms.
pub fn decision_seed(base_seed: u64, agent_id: &str, year: u32) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64 ^ base_seed;
    for byte in agent_id.bytes().chain(year.to_le_bytes()) {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// The assembled prompt plus what the decision loop needs to know about it.
#[derive(Debug, Clone)]
pub struct BuiltContext {
    pub prompt: String,
    /// Skill ids in the order they were shown, for index-based parsing.
    pub presented_skills: Vec<String>,
    pub token_estimate: usize,
}

/// Runs the provider chain in its fixed order and enforces the token budget
/// by graceful degradation: trim gossip to 3 items, trim news to 2, truncate
/// the institutional block, then hard-truncate with an explicit marker.
pub struct ContextBuilder {
    providers: Vec<Box<dyn ContextProvider>>,
    budget: TokenBudget,
    counter: Box<dyn TokenCounter>,
    base_seed: u64,
}

impl ContextBuilder {
    /// The default chain; physical-reality sections precede social ones so
    /// recency bias favors survival-critical inputs.
    pub fn new(
        prompt_template: impl Into<String>,
        response_instructions: impl Into<String>,
        budget: TokenBudget,
        base_seed: u64,
    ) -> Result<Self> {
        budget.validate()?;
        let providers: Vec<Box<dyn ContextProvider>> = vec![
            Box::new(SystemPromptProvider::new(prompt_template.into())),
            Box::new(AgentAttributesProvider),
            Box::new(EnvironmentProvider),
            Box::new(InstitutionalProvider),
            Box::new(EventsProvider),
            Box::new(ObservableMetricsProvider),
            Box::new(SocialObservationProvider::default()),
            Box::new(MemoryProvider),
            Box::new(SkillsProvider),
            Box::new(FeedbackProvider),
            Box::new(ResponseFormatProvider::new(response_instructions.into())),
        ];
        Ok(Self {
            providers,
            budget,
            counter: Box::new(HeuristicCounter),
            base_seed,
        })
    }

    pub fn with_providers(mut self, providers: Vec<Box<dyn ContextProvider>>) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_counter(mut self, counter: Box<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    pub fn build(&self, request: &ContextRequest) -> Result<BuiltContext> {
        let mut request = request.clone();

        // option shuffling, seeded per (agent, year) to defeat first-option
        // preference while staying reproducible
        let seed = decision_seed(self.base_seed, &request.agent.id, request.year);
        let mut rng = StdRng::seed_from_u64(seed);
        request.skills.shuffle(&mut rng);
        let presented: Vec<String> = request.skills.iter().map(|(id, _)| id.clone()).collect();

        // degrade stepwise until the prompt fits
        let ladder: [(Option<usize>, Option<usize>); 3] = [
            (None, None),
            (Some(GOSSIP_TRIM), None),
            (Some(GOSSIP_TRIM), Some(NEWS_TRIM)),
        ];

        let mut sections = Vec::new();
        for (step, (max_gossip, max_news)) in ladder.iter().enumerate() {
            request.max_gossip = *max_gossip;
            request.max_news = *max_news;
            sections = self.assemble(&request)?;
            let total = self.total_tokens(&sections);
            if total <= self.budget.total {
                return Ok(self.finish(sections, presented));
            }
            if step > 0 {
                debug!(step, total, budget = self.budget.total, "prompt over budget, degrading");
            }
        }

        // truncate the institutional block to its own section budget
        let institutional_chars = self.budget.section_budget(BudgetSection::Institutional) * 4;
        for (section, text) in sections.iter_mut() {
            if *section == BudgetSection::Institutional && text.len() > institutional_chars {
                let mut truncated = truncate_at_boundary(text, institutional_chars).to_string();
                truncated.push_str("\n");
                truncated.push_str(TRUNCATION_MARKER);
                *text = truncated;
            }
        }
        if self.total_tokens(&sections) <= self.budget.total {
            return Ok(self.finish(sections, presented));
        }

        // last resort: hard-truncate the assembled string, never fail
        let assembled = join_sections(&sections);
        let budget_chars = (self.budget.total * 4).saturating_sub(TRUNCATION_MARKER.len() + 1);
        let mut prompt = truncate_at_boundary(&assembled, budget_chars).to_string();
        if !prompt.is_empty() {
            prompt.push('\n');
        }
        prompt.push_str(TRUNCATION_MARKER);
        let token_estimate = self.counter.count(&prompt);
        debug!(token_estimate, budget = self.budget.total, "prompt hard-truncated");

        Ok(BuiltContext {
            prompt,
            presented_skills: presented,
            token_estimate,
        })
    }

    fn assemble(&self, request: &ContextRequest) -> Result<Vec<(BudgetSection, String)>> {
        let mut sections = Vec::new();
        for provider in &self.providers {
            if let Some(text) = provider.provide(request)? {
                sections.push((provider.section(), text));
            }
        }
        Ok(sections)
    }

    fn total_tokens(&self, sections: &[(BudgetSection, String)]) -> usize {
        sections
            .iter()
            .map(|(_, text)| self.counter.count(text))
            .sum()
    }

    fn finish(
        &self,
        sections: Vec<(BudgetSection, String)>,
        presented: Vec<String>,
    ) -> BuiltContext {
        let prompt = join_sections(&sections);
        let token_estimate = self.counter.count(&prompt);
        BuiltContext {
            prompt,
            presented_skills: presented,
            token_estimate,
        }
    }
}

fn join_sections(sections: &[(BudgetSection, String)]) -> String {
    sections
        .iter()
        .map(|(_, text)| text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate_at_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
