use std::collections::HashMap;

use serde_json::{Value, json};

use wagf_core::{AgentSnapshot, EnvironmentalState, OrdinalLabel, Result};

use crate::budget::BudgetSection;
use crate::render::TemplateRenderer;

/// Everything a provider may draw on for one decision. Neighbor snapshots
/// are the previous year's state; the builder never sees same-year effects.
#[derive(Debug, Clone)]
pub struct ContextRequest {
    pub agent: AgentSnapshot,
    pub year: u32,
    pub environment: EnvironmentalState,
    pub neighbors: Vec<AgentSnapshot>,
    pub memories: Vec<String>,
    /// `(id, description)` pairs in presentation order; the builder shuffles
    /// these before the chain runs.
    pub skills: Vec<(String, String)>,
    /// Re-prompt block naming violated rules and remaining valid actions.
    pub feedback: Option<String>,
    /// Degradation knobs, set by the builder when over budget.
    pub max_gossip: Option<usize>,
    pub max_news: Option<usize>,
}

impl ContextRequest {
    pub fn new(agent: AgentSnapshot, year: u32, environment: EnvironmentalState) -> Self {
        Self {
            agent,
            year,
            environment,
            neighbors: Vec::new(),
            memories: Vec::new(),
            skills: Vec::new(),
            feedback: None,
            max_gossip: None,
            max_news: None,
        }
    }

    pub fn with_neighbors(mut self, neighbors: Vec<AgentSnapshot>) -> Self {
        self.neighbors = neighbors;
        self
    }

    pub fn with_memories(mut self, memories: Vec<String>) -> Self {
        self.memories = memories;
        self
    }

    pub fn with_skills(mut self, skills: Vec<(String, String)>) -> Self {
        self.skills = skills;
        self
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }
}

/// One stage in the assembly chain. Returning `None` drops the section.
pub trait ContextProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn section(&self) -> BudgetSection;
    fn provide(&self, request: &ContextRequest) -> Result<Option<String>>;
}

/// Constructs rendered with inline semantic anchoring: `TP=M (Medium)`.
pub fn anchor_constructs(
    constructs: &std::collections::BTreeMap<String, OrdinalLabel>,
) -> String {
    constructs
        .iter()
        .map(|(name, label)| format!("{name}={}", label.anchored()))
        .collect::<Vec<_>>()
        .join(", ")
}

// --- chain stage 1: system prompt -----------------------------------------

pub struct SystemPromptProvider {
    template: String,
    renderer: TemplateRenderer,
}

impl SystemPromptProvider {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            renderer: TemplateRenderer::new(),
        }
    }
}

impl ContextProvider for SystemPromptProvider {
    fn name(&self) -> &'static str {
        "system_prompt"
    }

    fn section(&self) -> BudgetSection {
        BudgetSection::Prompt
    }

    fn provide(&self, request: &ContextRequest) -> Result<Option<String>> {
        let mut agent = json!({
            "id": request.agent.id,
            "agent_type": request.agent.agent_type,
        });
        if let Value::Object(map) = &mut agent {
            for (key, value) in &request.agent.state {
                map.insert(key.clone(), value.clone());
            }
        }
        let mut context = HashMap::new();
        context.insert("agent".to_string(), agent);
        context.insert("year".to_string(), json!(request.year));

        let rendered = self.renderer.render(&self.template, &context)?;
        Ok((!rendered.trim().is_empty()).then_some(rendered))
    }
}

// --- chain stage 2: agent attributes --------------------------------------

pub struct AgentAttributesProvider;

impl ContextProvider for AgentAttributesProvider {
    fn name(&self) -> &'static str {
        "agent_attributes"
    }

    fn section(&self) -> BudgetSection {
        BudgetSection::Prompt
    }

    fn provide(&self, request: &ContextRequest) -> Result<Option<String>> {
        if request.agent.state.is_empty() {
            return Ok(None);
        }
        let mut lines = vec!["YOUR SITUATION:".to_string()];
        let ordered: std::collections::BTreeMap<_, _> = request.agent.state.iter().collect();
        for (key, value) in ordered {
            lines.push(format!("- {key}: {value}"));
        }
        if !request.agent.recent_decisions.is_empty() {
            lines.push(format!(
                "- recent decisions: {}",
                request.agent.recent_decisions.join(", ")
            ));
        }
        Ok(Some(lines.join("\n")))
    }
}

// --- chain stage 3: environmental perception ------------------------------

pub struct EnvironmentProvider;

impl ContextProvider for EnvironmentProvider {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn section(&self) -> BudgetSection {
        BudgetSection::Prompt
    }

    fn provide(&self, request: &ContextRequest) -> Result<Option<String>> {
        let mut lines = Vec::new();

        let news_cap = request.max_news.unwrap_or(usize::MAX);
        if !request.environment.global_events.is_empty() && news_cap > 0 {
            lines.push("WORLD NEWS:".to_string());
            for item in request.environment.global_events.iter().take(news_cap) {
                lines.push(format!("- {item}"));
            }
        }

        if let Some(Value::Object(local)) = request.environment.spatial.get(&request.agent.id) {
            let fields: std::collections::BTreeMap<_, _> = local
                .iter()
                .filter(|(key, _)| key.as_str() != "events")
                .collect();
            if !fields.is_empty() {
                lines.push("LOCAL CONDITIONS:".to_string());
                for (key, value) in fields {
                    lines.push(format!("- {key}: {value}"));
                }
            }
        }

        Ok((!lines.is_empty()).then(|| lines.join("\n")))
    }
}

// --- chain stage 4: events ------------------------------------------------

pub struct EventsProvider;

impl ContextProvider for EventsProvider {
    fn name(&self) -> &'static str {
        "events"
    }

    fn section(&self) -> BudgetSection {
        BudgetSection::Prompt
    }

    fn provide(&self, request: &ContextRequest) -> Result<Option<String>> {
        let events = request
            .environment
            .spatial
            .get(&request.agent.id)
            .and_then(|local| local.get("events"))
            .and_then(Value::as_array);

        let Some(events) = events else {
            return Ok(None);
        };
        if events.is_empty() {
            return Ok(None);
        }

        let mut lines = vec!["THIS YEAR'S EVENTS:".to_string()];
        for event in events {
            if let Some(text) = event.as_str() {
                lines.push(format!("- {text}"));
            }
        }
        Ok(Some(lines.join("\n")))
    }
}

// --- chain stage 5: observable metrics ------------------------------------

pub struct ObservableMetricsProvider;

impl ContextProvider for ObservableMetricsProvider {
    fn name(&self) -> &'static str {
        "observable_metrics"
    }

    fn section(&self) -> BudgetSection {
        BudgetSection::Prompt
    }

    fn provide(&self, request: &ContextRequest) -> Result<Option<String>> {
        if request.environment.metrics.is_empty() {
            return Ok(None);
        }
        let mut lines = vec!["OBSERVABLE METRICS:".to_string()];
        for (name, value) in &request.environment.metrics {
            lines.push(format!("- {name} = {value}"));
        }
        Ok(Some(lines.join("\n")))
    }
}

// --- chain stage 6: passive social observation ----------------------------

pub struct SocialObservationProvider {
    visible_fields: Vec<String>,
}

impl SocialObservationProvider {
    pub fn new(visible_fields: Vec<String>) -> Self {
        Self { visible_fields }
    }
}

impl Default for SocialObservationProvider {
    fn default() -> Self {
        Self::new(vec!["elevated".to_string(), "insured".to_string()])
    }
}

impl ContextProvider for SocialObservationProvider {
    fn name(&self) -> &'static str {
        "social_observation"
    }

    fn section(&self) -> BudgetSection {
        BudgetSection::Social
    }

    fn provide(&self, request: &ContextRequest) -> Result<Option<String>> {
        if request.neighbors.is_empty() {
            return Ok(None);
        }

        let cap = request.max_gossip.unwrap_or(usize::MAX);
        let mut lines = vec!["NEIGHBORHOOD (what you can observe):".to_string()];
        for neighbor in request.neighbors.iter().take(cap) {
            let visible: Vec<String> = self
                .visible_fields
                .iter()
                .filter_map(|field| {
                    neighbor
                        .state
                        .get(field)
                        .map(|value| format!("{field}={value}"))
                })
                .collect();
            let action = neighbor.last_decision().unwrap_or("unknown");
            lines.push(format!(
                "- {}: last action {}; {}",
                neighbor.id,
                action,
                visible.join(", ")
            ));
        }

        // aggregate metrics over the whole neighborhood, not just the
        // gossip sample
        let mut aggregates = Vec::new();
        for field in &self.visible_fields {
            let count = request.neighbors.iter().filter(|n| n.flag(field)).count();
            aggregates.push(format!("{field} {count}/{}", request.neighbors.len()));
        }
        if !aggregates.is_empty() {
            lines.push(format!("Around you: {}", aggregates.join(", ")));
        }

        Ok(Some(lines.join("\n")))
    }
}

// --- chain stage 7: memory ------------------------------------------------

pub struct MemoryProvider;

impl ContextProvider for MemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn section(&self) -> BudgetSection {
        BudgetSection::Memory
    }

    fn provide(&self, request: &ContextRequest) -> Result<Option<String>> {
        if request.memories.is_empty() {
            return Ok(None);
        }
        let mut lines = vec!["YOU REMEMBER:".to_string()];
        for (index, memory) in request.memories.iter().enumerate() {
            lines.push(format!("{}. {memory}", index + 1));
        }
        Ok(Some(lines.join("\n")))
    }
}

// --- chain stage 8: available skills --------------------------------------

pub struct SkillsProvider;

impl ContextProvider for SkillsProvider {
    fn name(&self) -> &'static str {
        "skills"
    }

    fn section(&self) -> BudgetSection {
        BudgetSection::Prompt
    }

    fn provide(&self, request: &ContextRequest) -> Result<Option<String>> {
        if request.skills.is_empty() {
            return Ok(None);
        }
        let mut lines = vec!["AVAILABLE ACTIONS:".to_string()];
        for (index, (_, presentation)) in request.skills.iter().enumerate() {
            lines.push(format!("{}. {presentation}", index + 1));
        }
        Ok(Some(lines.join("\n")))
    }
}

// --- re-prompt feedback ---------------------------------------------------

pub struct FeedbackProvider;

impl ContextProvider for FeedbackProvider {
    fn name(&self) -> &'static str {
        "feedback"
    }

    fn section(&self) -> BudgetSection {
        BudgetSection::Reserve
    }

    fn provide(&self, request: &ContextRequest) -> Result<Option<String>> {
        Ok(request.feedback.clone())
    }
}

// --- chain stage 9: response format ---------------------------------------

pub struct ResponseFormatProvider {
    instructions: String,
}

impl ResponseFormatProvider {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
        }
    }
}

impl ContextProvider for ResponseFormatProvider {
    fn name(&self) -> &'static str {
        "response_format"
    }

    fn section(&self) -> BudgetSection {
        BudgetSection::Reserve
    }

    fn provide(&self, _request: &ContextRequest) -> Result<Option<String>> {
        Ok(Some(self.instructions.clone()))
    }
}

// --- institutional block --------------------------------------------------

pub struct InstitutionalProvider;

impl ContextProvider for InstitutionalProvider {
    fn name(&self) -> &'static str {
        "institutional"
    }

    fn section(&self) -> BudgetSection {
        BudgetSection::Institutional
    }

    fn provide(&self, request: &ContextRequest) -> Result<Option<String>> {
        if request.environment.institutional.is_empty() {
            return Ok(None);
        }
        let mut lines = vec!["INSTITUTIONAL NOTICES:".to_string()];
        for notice in &request.environment.institutional {
            lines.push(format!("- {notice}"));
        }
        Ok(Some(lines.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn request() -> ContextRequest {
        let agent = AgentSnapshot::new("hh_1", "household")
            .with_state("elevated", json!(false))
            .with_state("funds", json!(5000.0));
        let mut environment = EnvironmentalState::for_year(3);
        environment.global_events = vec!["river crest broke records".into(), "levee funding cut".into()];
        environment.institutional = vec!["elevation subsidy covers 30%".into()];
        environment
            .spatial
            .insert("hh_1".into(), json!({"flood_depth": 1.2, "events": ["basement flooded"]}));
        environment.metrics.insert("community_insured_share".into(), 0.4);

        ContextRequest::new(agent, 3, environment)
            .with_memories(vec!["last year the street flooded".into()])
            .with_skills(vec![
                ("do_nothing".into(), "do_nothing: Take no action".into()),
                ("buy_insurance".into(), "buy_insurance: Purchase insurance".into()),
            ])
    }

    #[test]
    fn test_system_prompt_renders_agent() {
        let provider = SystemPromptProvider::new("You are {{ agent.id }}, year {{ year }}.");
        let text = provider.provide(&request()).unwrap().unwrap();
        assert_eq!(text, "You are hh_1, year 3.");
    }

    #[test]
    fn test_attributes_listed() {
        let text = AgentAttributesProvider.provide(&request()).unwrap().unwrap();
        assert!(text.contains("- elevated: false"));
        assert!(text.contains("- funds: 5000.0"));
    }

    #[test]
    fn test_environment_news_cap() {
        let mut req = request();
        let full = EnvironmentProvider.provide(&req).unwrap().unwrap();
        assert!(full.contains("levee funding cut"));

        req.max_news = Some(1);
        let trimmed = EnvironmentProvider.provide(&req).unwrap().unwrap();
        assert!(trimmed.contains("river crest"));
        assert!(!trimmed.contains("levee funding cut"));
    }

    #[test]
    fn test_events_from_spatial() {
        let text = EventsProvider.provide(&request()).unwrap().unwrap();
        assert!(text.contains("basement flooded"));
    }

    #[test]
    fn test_social_gossip_cap_and_aggregates() {
        let mut req = request();
        req.neighbors = (0..5)
            .map(|i| {
                AgentSnapshot::new(format!("hh_{}", i + 2), "household")
                    .with_state("insured", json!(i % 2 == 0))
                    .with_state("elevated", json!(false))
            })
            .collect();

        let provider = SocialObservationProvider::default();
        let full = provider.provide(&req).unwrap().unwrap();
        assert!(full.contains("hh_6"));
        assert!(full.contains("insured 3/5"));

        req.max_gossip = Some(3);
        let trimmed = provider.provide(&req).unwrap().unwrap();
        assert!(!trimmed.contains("hh_6"));
        // aggregates still computed over everyone
        assert!(trimmed.contains("insured 3/5"));
    }

    #[test]
    fn test_memory_numbered() {
        let text = MemoryProvider.provide(&request()).unwrap().unwrap();
        assert!(text.contains("1. last year the street flooded"));
    }

    #[test]
    fn test_skills_numbered_in_presented_order() {
        let text = SkillsProvider.provide(&request()).unwrap().unwrap();
        assert!(text.contains("1. do_nothing"));
        assert!(text.contains("2. buy_insurance"));
    }

    #[test]
    fn test_empty_sections_dropped() {
        let req = ContextRequest::new(
            AgentSnapshot::new("hh_9", "household"),
            1,
            EnvironmentalState::for_year(1),
        );
        assert!(MemoryProvider.provide(&req).unwrap().is_none());
        assert!(EventsProvider.provide(&req).unwrap().is_none());
        assert!(InstitutionalProvider.provide(&req).unwrap().is_none());
        assert!(SocialObservationProvider::default().provide(&req).unwrap().is_none());
    }

    #[test]
    fn test_anchor_constructs() {
        let mut constructs = BTreeMap::new();
        constructs.insert("TP".to_string(), OrdinalLabel::Medium);
        constructs.insert("CP".to_string(), OrdinalLabel::VeryHigh);
        assert_eq!(anchor_constructs(&constructs), "CP=VH (Very High), TP=M (Medium)");
    }
}
