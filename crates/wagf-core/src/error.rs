use crate::traits::llm::LlmError;

#[derive(thiserror::Error, Debug)]
pub enum WagfError {
    #[error("config error: {0}")]
    Config(String),

    #[error("duplicate skill id: {0}")]
    DuplicateSkill(String),

    #[error("unknown skill: {0}")]
    UnknownSkill(String),

    #[error("unknown agent type: {0}")]
    UnknownAgentType(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("rule '{rule}' failed to evaluate: {message}")]
    RuleEvaluation { rule: String, message: String },

    #[error("effect rejected for agent {agent}: {message}")]
    EffectRejected { agent: String, message: String },

    #[error("audit sink error: {0}")]
    Audit(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WagfError>;
