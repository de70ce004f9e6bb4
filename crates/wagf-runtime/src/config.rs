use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use wagf_context::TokenBudget;
use wagf_governance::{GovernanceMode, GovernanceRule};
use wagf_llm::{ParsingConfig, ResponseFormat};
use wagf_memory::MemoryConfig;
use wagf_reflection::ReflectionConfig;
use wagf_core::{Result, WagfError};

/// LLM sampling parameters handed through to the provider adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmParams {
    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,

    #[serde(default = "default_num_predict")]
    pub num_predict: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmParams {
    fn default() -> Self {
        Self {
            num_ctx: default_num_ctx(),
            num_predict: default_num_predict(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GlobalConfig {
    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub llm: LlmParams,

    #[serde(default)]
    pub governance_mode: GovernanceMode,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_secs: u64,

    #[serde(default)]
    pub cache_enabled: bool,
}

/// Blocks every agent type shares: the rating scale and the response
/// contract with its sentinels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    #[serde(default = "default_rating_scale")]
    pub rating_scale: Vec<String>,

    #[serde(default)]
    pub response_format: ResponseFormat,

    #[serde(default)]
    pub token_budget: TokenBudget,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            rating_scale: default_rating_scale(),
            response_format: ResponseFormat::default(),
            token_budget: TokenBudget::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GovernanceSection {
    #[serde(default)]
    pub rules: Vec<GovernanceRule>,
}

/// Per-type prompt template, parsing hints, governance rules and memory /
/// reflection overrides. The layout is a generic `agent_types.<type>` map,
/// never a fixed two-category split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTypeConfig {
    pub prompt_template: String,

    #[serde(default)]
    pub parsing: ParsingConfig,

    #[serde(default)]
    pub governance: GovernanceSection,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_config: Option<MemoryConfig>,

    #[serde(default)]
    pub reflection_config: ReflectionConfig,

    /// Per-type fallback; the registry default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_skill: Option<String>,
}

/// The whole `agent_types.yaml` surface.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentTypesFile {
    #[serde(default)]
    pub global_config: GlobalConfig,

    #[serde(default)]
    pub shared: SharedConfig,

    #[serde(default)]
    pub agent_types: HashMap<String, AgentTypeConfig>,
}

impl AgentTypesFile {
    pub fn load_str(yaml: &str) -> Result<Self> {
        let file: AgentTypesFile = serde_yaml::from_str(yaml)?;
        file.validate()?;
        Ok(file)
    }

    pub fn load_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::load_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.shared.rating_scale != default_rating_scale() {
            return Err(WagfError::Config(format!(
                "rating_scale must be the five-level {:?} scale, got {:?}",
                default_rating_scale(),
                self.shared.rating_scale
            )));
        }
        self.shared.token_budget.validate()?;
        if self.agent_types.is_empty() {
            return Err(WagfError::Config("no agent types configured".into()));
        }
        Ok(())
    }

    pub fn agent_type(&self, name: &str) -> Result<&AgentTypeConfig> {
        self.agent_types
            .get(name)
            .ok_or_else(|| WagfError::UnknownAgentType(name.to_string()))
    }
}

/// Runner-level knobs, mostly surfaced as CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub years: u32,

    #[serde(default)]
    pub seed: u64,

    #[serde(default = "default_workers")]
    pub workers: usize,

    pub output_dir: PathBuf,

    #[serde(default = "default_model")]
    pub model: String,

    /// Escalate an effect rejection from per-agent to run-fatal.
    #[serde(default)]
    pub strict_effects: bool,
}

impl ExperimentConfig {
    pub fn new(years: u32, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            years,
            seed: 0,
            workers: default_workers(),
            output_dir: output_dir.into(),
            model: default_model(),
            strict_effects: false,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

fn default_num_ctx() -> u32 {
    4096
}

fn default_num_predict() -> u32 {
    512
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_attempts() -> u32 {
    3
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_rating_scale() -> Vec<String> {
    vec!["VL".into(), "L".into(), "M".into(), "H".into(), "VH".into()]
}

fn default_workers() -> usize {
    1
}

fn default_model() -> String {
    "mock".to_string()
}
