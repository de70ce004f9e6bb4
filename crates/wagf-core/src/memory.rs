//! Memory item model shared by the engines and the reflection pipeline

use serde::{Deserialize, Serialize};

/// Where a memory came from. Reflections carry their own tag so stratified
/// retrieval can give them a dedicated slice instead of letting them crowd
/// out personal events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    Personal,
    Neighbor,
    Community,
    Abstract,
    Social,
    Reflection,
}

impl MemorySource {
    pub const ALL: [MemorySource; 6] = [
        MemorySource::Personal,
        MemorySource::Neighbor,
        MemorySource::Community,
        MemorySource::Abstract,
        MemorySource::Social,
        MemorySource::Reflection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemorySource::Personal => "personal",
            MemorySource::Neighbor => "neighbor",
            MemorySource::Community => "community",
            MemorySource::Abstract => "abstract",
            MemorySource::Social => "social",
            MemorySource::Reflection => "reflection",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionTag {
    Critical,
    Major,
    Positive,
    Shift,
    Observation,
    Routine,
}

impl EmotionTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionTag::Critical => "critical",
            EmotionTag::Major => "major",
            EmotionTag::Positive => "positive",
            EmotionTag::Shift => "shift",
            EmotionTag::Observation => "observation",
            EmotionTag::Routine => "routine",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    #[default]
    Event,
    Reasoning,
    Reflection,
    Resolution,
    Message,
}

/// Insertion-time tags for a memory. When `importance` is absent the
/// human-centric engine derives it from its emotion and source weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMetadata {
    pub timestamp: u64,
    pub source: MemorySource,
    pub emotion: EmotionTag,
    #[serde(default)]
    pub kind: MemoryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,
}

impl MemoryMetadata {
    pub fn new(timestamp: u64, source: MemorySource, emotion: EmotionTag) -> Self {
        Self {
            timestamp,
            source,
            emotion,
            kind: MemoryKind::Event,
            importance: None,
        }
    }

    pub fn with_kind(mut self, kind: MemoryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance.clamp(0.0, 1.0));
        self
    }
}

/// A stored memory. Importance stays in [0,1] from construction onward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub content: String,
    pub timestamp: u64,
    pub source: MemorySource,
    pub emotion: EmotionTag,
    #[serde(default)]
    pub kind: MemoryKind,
    pub base_importance: f64,
    pub decayed_importance: f64,
    #[serde(default)]
    pub consolidated: bool,
}

impl MemoryItem {
    pub fn new(content: impl Into<String>, meta: &MemoryMetadata, base_importance: f64) -> Self {
        let base = base_importance.clamp(0.0, 1.0);
        Self {
            content: content.into(),
            timestamp: meta.timestamp,
            source: meta.source,
            emotion: meta.emotion,
            kind: meta.kind,
            base_importance: base,
            decayed_importance: base,
            consolidated: false,
        }
    }

    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }
}

const INSIGHT_SUMMARY_MAX: usize = 500;

/// Consolidated semantic insight produced by the reflection engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionInsight {
    pub summary: String,
    pub importance: f64,
    pub year_created: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub construct_context: Option<String>,
}

impl ReflectionInsight {
    pub fn new(summary: impl Into<String>, importance: f64, year_created: u32) -> Self {
        let mut summary: String = summary.into();
        if summary.chars().count() > INSIGHT_SUMMARY_MAX {
            summary = summary.chars().take(INSIGHT_SUMMARY_MAX).collect();
        }
        Self {
            summary,
            importance: importance.clamp(0.0, 1.0),
            year_created,
            construct_context: None,
        }
    }

    pub fn with_construct_context(mut self, context: impl Into<String>) -> Self {
        self.construct_context = Some(context.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_importance_clamped() {
        let meta = MemoryMetadata::new(3, MemorySource::Personal, EmotionTag::Critical);
        let item = MemoryItem::new("flooded again", &meta, 1.7);
        assert_eq!(item.base_importance, 1.0);
        assert_eq!(item.decayed_importance, 1.0);

        let item = MemoryItem::new("nothing happened", &meta, -0.2);
        assert_eq!(item.base_importance, 0.0);
    }

    #[test]
    fn test_age_saturates() {
        let meta = MemoryMetadata::new(5, MemorySource::Neighbor, EmotionTag::Observation);
        let item = MemoryItem::new("neighbor elevated", &meta, 0.5);
        assert_eq!(item.age(8), 3);
        assert_eq!(item.age(2), 0);
    }

    #[test]
    fn test_insight_summary_truncated() {
        let long = "x".repeat(800);
        let insight = ReflectionInsight::new(long, 0.9, 4);
        assert_eq!(insight.summary.chars().count(), 500);
        assert_eq!(insight.year_created, 4);
    }

    #[test]
    fn test_source_tags_roundtrip() {
        for source in MemorySource::ALL {
            let yaml = serde_yaml::to_string(&source).unwrap();
            let back: MemorySource = serde_yaml::from_str(&yaml).unwrap();
            assert_eq!(back, source);
        }
    }
}
