use serde::{Deserialize, Serialize};

/// ERROR blocks the proposal and triggers a retry; WARNING is logged only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
}

/// Outcome of one governance rule applied to one proposal.
///
/// `valid` always equals `severity != Error`; the constructors are the only
/// way these are built, which keeps the pair consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub rule_id: String,
    pub severity: Severity,
    pub valid: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
}

impl ValidationResult {
    pub fn error(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity: Severity::Error,
            valid: false,
            reason: reason.into(),
            alternatives: Vec::new(),
        }
    }

    pub fn warning(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity: Severity::Warning,
            valid: true,
            reason: reason.into(),
            alternatives: Vec::new(),
        }
    }

    pub fn with_alternatives<I, S>(mut self, alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alternatives = alternatives.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Error
    }
}
