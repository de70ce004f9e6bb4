//! Prompt assembly under a token budget
//!
//! The builder runs a fixed provider chain (physical-reality sections before
//! social ones), estimates tokens per section, and degrades gracefully when
//! the assembled prompt exceeds the budget. A hard runtime failure on
//! overflow is forbidden here; the worst case is a truncated but valid
//! prompt.

mod budget;
mod builder;
mod provider;
mod render;

pub use budget::{BudgetSection, HeuristicCounter, TokenBudget, TokenCounter};
pub use builder::{BuiltContext, ContextBuilder, decision_seed};
pub use provider::{
    AgentAttributesProvider, ContextProvider, ContextRequest, EnvironmentProvider, EventsProvider,
    FeedbackProvider, InstitutionalProvider, MemoryProvider, ObservableMetricsProvider,
    ResponseFormatProvider, SkillsProvider, SocialObservationProvider, SystemPromptProvider,
    anchor_constructs,
};
pub use render::TemplateRenderer;
