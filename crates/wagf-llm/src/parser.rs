use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;
use tracing::trace;

use wagf_core::{OrdinalLabel, SkillProposal};

use crate::config::{ParsingConfig, ResponseFormat};
use crate::preprocess::between;

const LABEL_PATTERN: &str =
    r"very[\s_]+low|very[\s_]+high|vl|vh|low|medium|moderate|mid|high|l|m|h";

/// Five-tier reply parser. Tiers are applied in order until one succeeds;
/// if none do, the proposal is marked unparseable and the broker takes over.
pub struct SkillParser {
    config: ParsingConfig,
    format: ResponseFormat,
    decision_kv: Regex,
    construct_kv: Vec<(String, Regex)>,
    reasoning_kv: Regex,
    keyword_finder: Regex,
    lone_int: Regex,
    trailing_comma: Regex,
}

impl SkillParser {
    pub fn new(config: ParsingConfig, format: ResponseFormat) -> Self {
        let keywords: Vec<String> = config
            .decision_keywords
            .iter()
            .map(|k| regex::escape(k))
            .collect();
        let keyword_alt = keywords.join("|");

        let decision_kv = Regex::new(&format!(
            r#"(?i)\b(?:{keyword_alt})\b\s*[:=>\-]*\s*"?([A-Za-z_][A-Za-z0-9_\- ]{{0,40}})"#
        ))
        .expect("decision pattern");

        let keyword_finder =
            Regex::new(&format!(r"(?i)\b(?:{keyword_alt})\b")).expect("keyword pattern");

        let mut label_alternatives = config
            .normalization
            .keys()
            .map(|k| regex::escape(&k.to_ascii_lowercase()))
            .collect::<Vec<_>>();
        label_alternatives.push(LABEL_PATTERN.to_string());
        let label_pattern = label_alternatives.join("|");

        let mut construct_kv = Vec::new();
        let mut canonicals: Vec<&String> = config.synonyms.keys().collect();
        canonicals.sort();
        for canonical in canonicals {
            let mut tokens = vec![regex::escape(canonical)];
            for synonym in &config.synonyms[canonical] {
                tokens.push(regex::escape(synonym));
            }
            tokens.sort_by_key(|t| std::cmp::Reverse(t.len()));
            let pattern = format!(
                r#"(?i)\b(?:{})\b\s*[:=>\-]*\s*"?((?:{})\b)"#,
                tokens.join("|"),
                label_pattern
            );
            construct_kv.push((canonical.clone(), Regex::new(&pattern).expect("construct pattern")));
        }

        Self {
            config,
            format,
            decision_kv,
            construct_kv,
            reasoning_kv: Regex::new(r#"(?i)\breasoning\b\s*[:=]\s*"?([^"\n}]+)"#)
                .expect("reasoning pattern"),
            keyword_finder,
            lone_int: Regex::new(r"^\s*\(?(\d{1,3})[).\s]*$").expect("integer pattern"),
            trailing_comma: Regex::new(r",\s*([}\]])").expect("comma pattern"),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// `presented` is the skill list in the order it was shown, used for the
    /// proximity and last-resort-digit tiers.
    pub fn parse(&self, agent_id: &str, raw: &str, presented: &[String]) -> SkillProposal {
        for (tier, attempt) in [
            self.tier_strict_json(raw),
            self.tier_repaired_json(raw),
            self.tier_key_value(raw, presented),
            self.tier_proximity(raw, presented),
            self.tier_digit(raw, presented),
        ]
        .into_iter()
        .enumerate()
        {
            if let Some(parsed) = attempt {
                trace!(agent = agent_id, tier = tier + 1, skill = %parsed.skill, "reply parsed");
                let mut proposal = SkillProposal::new(agent_id, parsed.skill)
                    .with_reasoning(parsed.reasoning)
                    .with_raw_text(raw);
                proposal.constructs = parsed.constructs;
                if let Some(confidence) = parsed.confidence {
                    proposal.confidence = Some(confidence.clamp(0.0, 1.0));
                }
                return proposal;
            }
        }
        SkillProposal::unparseable(agent_id, raw)
    }

    /// Canonical wire form of a proposal; `parse` recovers it exactly.
    pub fn format_proposal(&self, proposal: &SkillProposal) -> String {
        let mut object = serde_json::Map::new();
        let keyword = self
            .config
            .decision_keywords
            .first()
            .cloned()
            .unwrap_or_else(|| "decision".to_string());
        object.insert(
            keyword,
            Value::from(proposal.skill.clone().unwrap_or_default()),
        );
        if !proposal.reasoning.is_empty() {
            object.insert("reasoning".into(), Value::from(proposal.reasoning.clone()));
        }
        for (name, label) in &proposal.constructs {
            object.insert(name.clone(), Value::from(label.code()));
        }
        if let Some(confidence) = proposal.confidence {
            object.insert("confidence".into(), Value::from(confidence));
        }
        format!(
            "{}\n{}\n{}",
            self.format.start_sentinel,
            Value::Object(object),
            self.format.end_sentinel
        )
    }

    // --- tier 1: strict JSON between the documented sentinels ---

    fn tier_strict_json(&self, raw: &str) -> Option<ParsedReply> {
        let inner = between(raw, &self.format.start_sentinel, &self.format.end_sentinel)?;
        let value: Value = serde_json::from_str(inner.trim()).ok()?;
        self.from_json(&value)
    }

    // --- tier 2: repaired JSON ---

    fn tier_repaired_json(&self, raw: &str) -> Option<ParsedReply> {
        let start = raw.find('{')?;
        let end = raw.rfind('}').map(|e| e + 1).unwrap_or(raw.len());
        if start >= end {
            return None;
        }
        let mut candidate = raw[start..end].to_string();

        let quotes = candidate.matches('"').count();
        if quotes % 2 == 1 {
            candidate.push('"');
        }
        let open = candidate.matches('{').count();
        let close = candidate.matches('}').count();
        for _ in close..open {
            candidate.push('}');
        }
        let candidate = self.trailing_comma.replace_all(&candidate, "$1");

        let value: Value = serde_json::from_str(&candidate).ok()?;
        self.from_json(&value)
    }

    fn from_json(&self, value: &Value) -> Option<ParsedReply> {
        let object = value.as_object()?;

        let mut skill = None;
        for keyword in &self.config.decision_keywords {
            if let Some(found) = object
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(keyword))
                .and_then(|(_, v)| v.as_str())
            {
                skill = Some(self.normalize_skill(found));
                break;
            }
        }
        let skill = skill.filter(|s| !s.is_empty())?;

        let mut constructs = BTreeMap::new();
        let mut canonicals: Vec<&String> = self.config.synonyms.keys().collect();
        canonicals.sort();
        for canonical in canonicals {
            let mut names = vec![canonical.clone()];
            names.extend(self.config.synonyms[canonical].iter().cloned());
            for (key, value) in object {
                if names.iter().any(|n| n.eq_ignore_ascii_case(key)) {
                    if let Some(label) = value.as_str().and_then(|s| self.resolve_label(s)) {
                        constructs.insert(canonical.clone(), label);
                        break;
                    }
                }
            }
        }

        let reasoning = object
            .iter()
            .find(|(k, _)| {
                k.eq_ignore_ascii_case("reasoning")
                    || k.eq_ignore_ascii_case("rationale")
                    || k.eq_ignore_ascii_case("explanation")
            })
            .and_then(|(_, v)| v.as_str())
            .unwrap_or_default()
            .to_string();

        let confidence = object
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("confidence"))
            .and_then(|(_, v)| v.as_f64());

        Some(ParsedReply {
            skill,
            reasoning,
            constructs,
            confidence,
        })
    }

    // --- tier 3: key-value regex over decision keywords and synonyms ---

    fn tier_key_value(&self, raw: &str, presented: &[String]) -> Option<ParsedReply> {
        let capture = self.decision_kv.captures(raw)?;
        let token = capture.get(1)?.as_str();
        let skill = self.resolve_skill_token(token, presented)?;

        let mut constructs = BTreeMap::new();
        for (canonical, pattern) in &self.construct_kv {
            if let Some(found) = pattern.captures(raw).and_then(|c| c.get(1)) {
                if let Some(label) = self.resolve_label(found.as_str()) {
                    constructs.insert(canonical.clone(), label);
                }
            }
        }

        let reasoning = self
            .reasoning_kv
            .captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();

        Some(ParsedReply {
            skill,
            reasoning,
            constructs,
            confidence: None,
        })
    }

    // --- tier 4: nearest known skill token around a decision keyword ---

    fn tier_proximity(&self, raw: &str, presented: &[String]) -> Option<ParsedReply> {
        let window = self.config.proximity_window;
        let keyword = self.keyword_finder.find(raw)?;

        let mut start = keyword.start().saturating_sub(window);
        while !raw.is_char_boundary(start) {
            start -= 1;
        }
        let mut end = (keyword.end() + window).min(raw.len());
        while !raw.is_char_boundary(end) {
            end += 1;
        }
        let slice = raw[start..end].to_ascii_lowercase();

        let mut nearest: Option<(usize, String)> = None;
        let anchor = keyword.start() - start;
        for candidate in self.known_skill_tokens(presented) {
            if let Some(position) = slice.find(&candidate.0.to_ascii_lowercase()) {
                let distance = position.abs_diff(anchor);
                if nearest.as_ref().map(|(d, _)| distance < *d).unwrap_or(true) {
                    nearest = Some((distance, candidate.1));
                }
            }
        }

        nearest.map(|(_, skill)| ParsedReply {
            skill,
            reasoning: String::new(),
            constructs: BTreeMap::new(),
            confidence: None,
        })
    }

    // --- tier 5: a lone integer indexes the presented skill list (1-based) ---

    fn tier_digit(&self, raw: &str, presented: &[String]) -> Option<ParsedReply> {
        let capture = self.lone_int.captures(raw.trim())?;
        let index: usize = capture.get(1)?.as_str().parse().ok()?;
        let skill = presented.get(index.checked_sub(1)?)?.clone();
        Some(ParsedReply {
            skill,
            reasoning: String::new(),
            constructs: BTreeMap::new(),
            confidence: None,
        })
    }

    // --- token resolution ---

    /// Surface tokens that name a skill: presented ids plus alias keys,
    /// paired with the canonical id each resolves to.
    fn known_skill_tokens(&self, presented: &[String]) -> Vec<(String, String)> {
        let mut tokens: Vec<(String, String)> = presented
            .iter()
            .map(|id| (id.clone(), id.clone()))
            .collect();
        let mut aliases: Vec<(&String, &String)> = self.config.alias_map.iter().collect();
        aliases.sort();
        for (alias, canonical) in aliases {
            tokens.push((alias.clone(), canonical.clone()));
        }
        tokens
    }

    /// Normalize a decision token through the alias map, then snake-case it.
    fn normalize_skill(&self, token: &str) -> String {
        let trimmed = token.trim().trim_matches(['"', '\'', '.', ',', '!', ':']);
        if let Some(canonical) = self.lookup_alias(trimmed) {
            return canonical;
        }
        trimmed.to_ascii_lowercase().replace([' ', '-'], "_")
    }

    /// A scraped token may trail extra words; try shrinking prefixes until
    /// one resolves against the presented list or the alias map.
    fn resolve_skill_token(&self, token: &str, presented: &[String]) -> Option<String> {
        let words: Vec<&str> = token.split_whitespace().collect();
        for take in (1..=words.len().min(4)).rev() {
            let candidate = self.normalize_skill(&words[..take].join(" "));
            if presented.iter().any(|p| *p == candidate) {
                return Some(candidate);
            }
        }
        for take in (1..=words.len().min(4)).rev() {
            if let Some(canonical) = self.lookup_alias(&words[..take].join(" ")) {
                return Some(canonical);
            }
        }
        None
    }

    fn lookup_alias(&self, token: &str) -> Option<String> {
        let token = token.trim();
        self.config
            .alias_map
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(token))
            .map(|(_, canonical)| canonical.clone())
    }

    /// Normalization dictionary first, then the lenient ordinal parse.
    fn resolve_label(&self, token: &str) -> Option<OrdinalLabel> {
        let trimmed = token.trim().trim_matches(['"', '\'']);
        if let Some(mapped) = self
            .config
            .normalization
            .iter()
            .find(|(term, _)| term.eq_ignore_ascii_case(trimmed))
            .map(|(_, code)| code)
        {
            return mapped.parse().ok();
        }
        trimmed.parse().ok()
    }
}

struct ParsedReply {
    skill: String,
    reasoning: String,
    constructs: BTreeMap<String, OrdinalLabel>,
    confidence: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parser() -> SkillParser {
        let config = ParsingConfig {
            synonyms: HashMap::from([
                ("TP".to_string(), vec!["threat".into(), "threat_perception".into()]),
                ("CP".to_string(), vec!["coping".into(), "coping_perception".into()]),
            ]),
            alias_map: HashMap::from([
                ("MAINTAIN".to_string(), "maintain_demand".to_string()),
                ("NOTHING".to_string(), "do_nothing".to_string()),
            ]),
            normalization: HashMap::from([("severe".to_string(), "VH".to_string())]),
            ..ParsingConfig::default()
        };
        SkillParser::new(config, ResponseFormat::default())
    }

    fn skills() -> Vec<String> {
        vec![
            "do_nothing".to_string(),
            "buy_insurance".to_string(),
            "elevate_house".to_string(),
        ]
    }

    #[test]
    fn test_tier1_strict_json() {
        let raw = r#"<<<DECISION>>>
{"decision": "buy_insurance", "reasoning": "threat is high", "TP": "VH", "CP": "H"}
<<<END>>>"#;
        let proposal = parser().parse("hh_1", raw, &skills());
        assert_eq!(proposal.skill.as_deref(), Some("buy_insurance"));
        assert_eq!(proposal.construct("TP"), Some(OrdinalLabel::VeryHigh));
        assert_eq!(proposal.construct("CP"), Some(OrdinalLabel::High));
        assert_eq!(proposal.reasoning, "threat is high");
    }

    #[test]
    fn test_tier2_repairs_trailing_comma() {
        let raw = r#"Here you go: {"decision": "do_nothing", "TP": "L",}"#;
        let proposal = parser().parse("hh_1", raw, &skills());
        assert_eq!(proposal.skill.as_deref(), Some("do_nothing"));
        assert_eq!(proposal.construct("TP"), Some(OrdinalLabel::Low));
    }

    #[test]
    fn test_tier2_repairs_missing_brace() {
        let raw = r#"{"decision": "do_nothing", "TP": "L""#;
        let proposal = parser().parse("hh_1", raw, &skills());
        assert_eq!(proposal.skill.as_deref(), Some("do_nothing"));
        assert_eq!(proposal.construct("TP"), Some(OrdinalLabel::Low));
    }

    #[test]
    fn test_tier3_key_value() {
        let raw = "Decision: buy insurance\nThreat: very high\nCoping: medium\nReasoning: floods keep coming";
        let proposal = parser().parse("hh_1", raw, &skills());
        assert_eq!(proposal.skill.as_deref(), Some("buy_insurance"));
        assert_eq!(proposal.construct("TP"), Some(OrdinalLabel::VeryHigh));
        assert_eq!(proposal.construct("CP"), Some(OrdinalLabel::Medium));
        assert_eq!(proposal.reasoning, "floods keep coming");
    }

    #[test]
    fn test_tier3_normalization_term() {
        let raw = "decision: do_nothing, threat: severe";
        let proposal = parser().parse("hh_1", raw, &skills());
        assert_eq!(proposal.construct("TP"), Some(OrdinalLabel::VeryHigh));
    }

    #[test]
    fn test_tier4_proximity() {
        let raw = "After much thought my decision is elevate_house for sure";
        let proposal = parser().parse("hh_1", raw, &skills());
        assert_eq!(proposal.skill.as_deref(), Some("elevate_house"));
    }

    #[test]
    fn test_tier4_alias_near_keyword() {
        let raw = "my choice would be MAINTAIN I think";
        let proposal = parser().parse("d_1", raw, &["maintain_demand".to_string()]);
        assert_eq!(proposal.skill.as_deref(), Some("maintain_demand"));
    }

    #[test]
    fn test_tier5_lone_integer() {
        let proposal = parser().parse("hh_1", "2.", &skills());
        assert_eq!(proposal.skill.as_deref(), Some("buy_insurance"));

        // out of range falls through to unparseable
        let proposal = parser().parse("hh_1", "9", &skills());
        assert!(!proposal.is_parseable());
    }

    #[test]
    fn test_all_tiers_fail() {
        let proposal = parser().parse("hh_1", "maybe...?", &skills());
        assert!(!proposal.is_parseable());
        assert_eq!(proposal.raw_text, "maybe...?");
    }

    #[test]
    fn test_alias_normalization_in_json() {
        let raw = r#"<<<DECISION>>>{"decision": "NOTHING"}<<<END>>>"#;
        let proposal = parser().parse("hh_1", raw, &skills());
        assert_eq!(proposal.skill.as_deref(), Some("do_nothing"));
    }

    #[test]
    fn test_format_parse_roundtrip() {
        let parser = parser();
        let original = SkillProposal::new("hh_1", "buy_insurance")
            .with_reasoning("threat outweighs cost")
            .with_construct("TP", OrdinalLabel::VeryHigh)
            .with_construct("CP", OrdinalLabel::High)
            .with_confidence(0.75);

        let formatted = parser.format_proposal(&original);
        let parsed = parser.parse("hh_1", &formatted, &skills());

        assert_eq!(parsed.skill, original.skill);
        assert_eq!(parsed.reasoning, original.reasoning);
        assert_eq!(parsed.constructs, original.constructs);
        assert_eq!(parsed.confidence, original.confidence);
    }
}
