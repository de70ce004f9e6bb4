use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Reflect every N years; 1 means at the end of every year.
    #[serde(default = "default_cadence")]
    pub cadence_years: u32,

    /// An agent with fewer memories than this is skipped.
    #[serde(default = "default_min_memories")]
    pub min_memories: usize,

    /// How many recent memories are quoted into the batch prompt per agent.
    #[serde(default = "default_memories_per_agent")]
    pub memories_per_agent: usize,

    /// Per-agent-type guidance questions steering the reflection.
    #[serde(default = "default_question_banks")]
    pub question_banks: HashMap<String, Vec<String>>,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            cadence_years: default_cadence(),
            min_memories: default_min_memories(),
            memories_per_agent: default_memories_per_agent(),
            question_banks: default_question_banks(),
        }
    }
}

impl ReflectionConfig {
    pub fn questions_for(&self, agent_type: &str) -> &[String] {
        self.question_banks
            .get(agent_type)
            .or_else(|| self.question_banks.get("default"))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn default_enabled() -> bool {
    true
}

fn default_cadence() -> u32 {
    1
}

fn default_min_memories() -> usize {
    1
}

fn default_memories_per_agent() -> usize {
    5
}

fn default_question_banks() -> HashMap<String, Vec<String>> {
    HashMap::from([
        (
            "default".to_string(),
            vec![
                "What mattered most this year?".to_string(),
                "What would you do differently?".to_string(),
            ],
        ),
        (
            "household".to_string(),
            vec![
                "How exposed does your home feel after this year?".to_string(),
                "Did your protective choices pay off?".to_string(),
            ],
        ),
        (
            "government".to_string(),
            vec![
                "Did policy keep pace with conditions on the ground?".to_string(),
                "Which groups were left behind this year?".to_string(),
            ],
        ),
        (
            "insurance".to_string(),
            vec!["How did claims compare to what was priced in?".to_string()],
        ),
        (
            "farmer".to_string(),
            vec!["How did water availability shape your season?".to_string()],
        ),
    ])
}
