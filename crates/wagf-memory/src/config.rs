use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use wagf_core::{EmotionTag, MemorySource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Window,
    Importance,
    #[default]
    HumanCentric,
}

impl EngineKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "window" => Some(EngineKind::Window),
            "importance" => Some(EngineKind::Importance),
            "humancentric" | "human_centric" => Some(EngineKind::HumanCentric),
            _ => None,
        }
    }
}

/// Weights of the composite retrieval score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetrievalWeights {
    #[serde(default = "default_recency_weight")]
    pub recency: f64,
    #[serde(default = "default_importance_weight")]
    pub importance: f64,
    #[serde(default = "default_contextual_weight")]
    pub contextual: f64,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            recency: default_recency_weight(),
            importance: default_importance_weight(),
            contextual: default_contextual_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub engine: EngineKind,

    /// Window engine capacity, and the human-centric working tier size.
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default = "default_working_capacity")]
    pub working_capacity: usize,

    #[serde(default)]
    pub weights: RetrievalWeights,

    /// Exponential decay rate applied to the long-term tier.
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,

    /// Base importance at or above which a working-tier item is promoted.
    #[serde(default = "default_consolidation_threshold")]
    pub consolidation_threshold: f64,

    #[serde(default = "default_emotion_weights")]
    pub emotion_weights: HashMap<EmotionTag, f64>,

    #[serde(default = "default_source_weights")]
    pub source_weights: HashMap<MemorySource, f64>,

    /// Per-source slots for stratified retrieval, in allocation order.
    #[serde(default = "default_stratified_allocation")]
    pub stratified_allocation: Vec<(MemorySource, usize)>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            window_size: default_window_size(),
            working_capacity: default_working_capacity(),
            weights: RetrievalWeights::default(),
            decay_rate: default_decay_rate(),
            consolidation_threshold: default_consolidation_threshold(),
            emotion_weights: default_emotion_weights(),
            source_weights: default_source_weights(),
            stratified_allocation: default_stratified_allocation(),
        }
    }
}

impl MemoryConfig {
    pub fn with_engine(mut self, engine: EngineKind) -> Self {
        self.engine = engine;
        self
    }

    pub fn emotion_weight(&self, emotion: EmotionTag) -> f64 {
        self.emotion_weights.get(&emotion).copied().unwrap_or(0.5)
    }

    pub fn source_weight(&self, source: MemorySource) -> f64 {
        self.source_weights.get(&source).copied().unwrap_or(0.5)
    }
}

fn default_window_size() -> usize {
    10
}

fn default_working_capacity() -> usize {
    20
}

fn default_recency_weight() -> f64 {
    0.3
}

fn default_importance_weight() -> f64 {
    0.5
}

fn default_contextual_weight() -> f64 {
    0.2
}

fn default_decay_rate() -> f64 {
    0.1
}

fn default_consolidation_threshold() -> f64 {
    0.6
}

fn default_emotion_weights() -> HashMap<EmotionTag, f64> {
    HashMap::from([
        (EmotionTag::Critical, 1.0),
        (EmotionTag::Major, 0.8),
        (EmotionTag::Shift, 0.7),
        (EmotionTag::Positive, 0.6),
        (EmotionTag::Observation, 0.4),
        (EmotionTag::Routine, 0.2),
    ])
}

fn default_source_weights() -> HashMap<MemorySource, f64> {
    HashMap::from([
        (MemorySource::Personal, 1.0),
        (MemorySource::Reflection, 0.9),
        (MemorySource::Community, 0.8),
        (MemorySource::Neighbor, 0.7),
        (MemorySource::Social, 0.6),
        (MemorySource::Abstract, 0.5),
    ])
}

fn default_stratified_allocation() -> Vec<(MemorySource, usize)> {
    vec![
        (MemorySource::Personal, 4),
        (MemorySource::Neighbor, 2),
        (MemorySource::Community, 2),
        (MemorySource::Reflection, 1),
        (MemorySource::Abstract, 1),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MemoryConfig::default();
        assert_eq!(config.engine, EngineKind::HumanCentric);
        assert_eq!(config.weights.recency, 0.3);
        assert_eq!(config.weights.importance, 0.5);
        assert_eq!(config.weights.contextual, 0.2);
        assert_eq!(config.consolidation_threshold, 0.6);
    }

    #[test]
    fn test_base_importance_inputs() {
        let config = MemoryConfig::default();
        assert_eq!(config.emotion_weight(EmotionTag::Critical), 1.0);
        assert_eq!(config.source_weight(MemorySource::Personal), 1.0);
        // critical personal event dominates a routine abstract one
        let critical = config.emotion_weight(EmotionTag::Critical)
            * config.source_weight(MemorySource::Personal);
        let routine = config.emotion_weight(EmotionTag::Routine)
            * config.source_weight(MemorySource::Abstract);
        assert!(critical > routine);
    }

    #[test]
    fn test_yaml_override() {
        let yaml = r#"
engine: window
window_size: 5
decay_rate: 0.25
"#;
        let config: MemoryConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.engine, EngineKind::Window);
        assert_eq!(config.window_size, 5);
        assert_eq!(config.decay_rate, 0.25);
        // untouched fields keep their defaults
        assert_eq!(config.weights.importance, 0.5);
    }

    #[test]
    fn test_engine_kind_parse() {
        assert_eq!(EngineKind::parse("window"), Some(EngineKind::Window));
        assert_eq!(EngineKind::parse("humancentric"), Some(EngineKind::HumanCentric));
        assert_eq!(EngineKind::parse("vector"), None);
    }
}
