use serde::{Deserialize, Serialize};

use wagf_core::{Result, WagfError};

/// Which budget slice a provider's output is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BudgetSection {
    Prompt,
    Memory,
    Social,
    Institutional,
    Reserve,
}

/// Soft per-section allocation of the prompt token budget. Shares must sum
/// to 1.0 within a tolerance of 1e-3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBudget {
    #[serde(default = "default_total")]
    pub total: usize,

    #[serde(default = "default_prompt_share")]
    pub prompt: f64,

    #[serde(default = "default_memory_share")]
    pub memory: f64,

    #[serde(default = "default_social_share")]
    pub social: f64,

    #[serde(default = "default_institutional_share")]
    pub institutional: f64,

    #[serde(default = "default_reserve_share")]
    pub reserve: f64,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            total: default_total(),
            prompt: default_prompt_share(),
            memory: default_memory_share(),
            social: default_social_share(),
            institutional: default_institutional_share(),
            reserve: default_reserve_share(),
        }
    }
}

impl TokenBudget {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let sum = self.prompt + self.memory + self.social + self.institutional + self.reserve;
        if (sum - 1.0).abs() > 1e-3 {
            return Err(WagfError::Config(format!(
                "token budget shares sum to {sum}, expected 1.0"
            )));
        }
        Ok(())
    }

    pub fn share(&self, section: BudgetSection) -> f64 {
        match section {
            BudgetSection::Prompt => self.prompt,
            BudgetSection::Memory => self.memory,
            BudgetSection::Social => self.social,
            BudgetSection::Institutional => self.institutional,
            BudgetSection::Reserve => self.reserve,
        }
    }

    pub fn section_budget(&self, section: BudgetSection) -> usize {
        (self.total as f64 * self.share(section)).floor() as usize
    }
}

/// Token estimation; a model-aware tokenizer is injected where available.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// The `len/4` fallback used when no model tokenizer is wired in.
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }
}

fn default_total() -> usize {
    4096
}

fn default_prompt_share() -> f64 {
    0.40
}

fn default_memory_share() -> f64 {
    0.25
}

fn default_social_share() -> f64 {
    0.15
}

fn default_institutional_share() -> f64 {
    0.10
}

fn default_reserve_share() -> f64 {
    0.10
}
