use regex::Regex;

use crate::config::ResponseFormat;

/// Families that interleave a reasoning chain with the answer.
const REASONING_FAMILIES: [&str; 4] = ["deepseek", "r1", "qwq", "reason"];

/// Families observed to drift out of the JSON block; for these the region
/// between the sentinels is cut out before parsing.
const DRIFT_FAMILIES: [&str; 4] = ["gemma", "llama", "mistral", "phi"];

/// Model-family-specific output transforms, selected by substring match
/// against the model name.
pub struct Preprocessor {
    model_name: String,
    think_block: Regex,
}

impl Preprocessor {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into().to_ascii_lowercase(),
            think_block: Regex::new(r"(?s)<think(?:ing)?>.*?</think(?:ing)?>")
                .expect("static regex"),
        }
    }

    fn is_family(&self, families: &[&str]) -> bool {
        families.iter().any(|f| self.model_name.contains(f))
    }

    pub fn apply(&self, text: &str, format: &ResponseFormat) -> String {
        let mut text = text.to_string();

        if self.is_family(&REASONING_FAMILIES) {
            text = self.think_block.replace_all(&text, "").into_owned();
        }

        if self.is_family(&DRIFT_FAMILIES) {
            if let Some(inner) = between(&text, &format.start_sentinel, &format.end_sentinel) {
                text = format!(
                    "{}{}{}",
                    format.start_sentinel, inner, format.end_sentinel
                );
            }
        }

        text.trim().to_string()
    }
}

/// Content between the first start sentinel and the next end sentinel.
pub(crate) fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let to = text[from..].find(end)? + from;
    Some(&text[from..to])
}
