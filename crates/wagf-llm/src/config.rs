use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-agent-type parsing hints, loaded from the agent type configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsingConfig {
    /// Keys the model may use for its chosen action.
    #[serde(default = "default_decision_keywords")]
    pub decision_keywords: Vec<String>,

    /// Canonical construct name -> surface tokens the model may emit for it.
    #[serde(default)]
    pub synonyms: HashMap<String, Vec<String>>,

    /// Model-emitted action label -> canonical skill id
    /// (e.g. `MAINTAIN` -> `maintain_demand`).
    #[serde(default)]
    pub alias_map: HashMap<String, String>,

    /// Free-text severity terms mapped onto the five-level scale
    /// (e.g. `severe` -> `VH`).
    #[serde(default)]
    pub normalization: HashMap<String, String>,

    /// Character window around a matched decision keyword searched for the
    /// nearest label token.
    #[serde(default = "default_proximity_window")]
    pub proximity_window: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            decision_keywords: default_decision_keywords(),
            synonyms: HashMap::new(),
            alias_map: HashMap::new(),
            normalization: HashMap::new(),
            proximity_window: default_proximity_window(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_decision_keywords() -> Vec<String> {
    vec!["decision".into(), "action".into(), "skill".into(), "choice".into()]
}

fn default_proximity_window() -> usize {
    35
}

fn default_max_retries() -> u32 {
    2
}

/// The response contract shared by all agent types: explicit sentinels and
/// the instruction block the context builder appends to every prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(default = "default_start_sentinel")]
    pub start_sentinel: String,

    #[serde(default = "default_end_sentinel")]
    pub end_sentinel: String,

    #[serde(default = "default_instructions")]
    pub instructions: String,
}

impl Default for ResponseFormat {
    fn default() -> Self {
        Self {
            start_sentinel: default_start_sentinel(),
            end_sentinel: default_end_sentinel(),
            instructions: default_instructions(),
        }
    }
}

fn default_start_sentinel() -> String {
    "<<<DECISION>>>".to_string()
}

fn default_end_sentinel() -> String {
    "<<<END>>>".to_string()
}

fn default_instructions() -> String {
    "Reply with a single JSON object between <<<DECISION>>> and <<<END>>>, \
     for example:\n<<<DECISION>>>\n{\"decision\": \"<skill_id>\", \
     \"reasoning\": \"<one sentence>\", \"TP\": \"<VL|L|M|H|VH>\", \
     \"CP\": \"<VL|L|M|H|VH>\"}\n<<<END>>>"
        .to_string()
}
