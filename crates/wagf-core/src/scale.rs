//! The five-level ordinal scale used for construct labels

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordinal assessment emitted by the model for a named construct
/// (e.g. threat perception, coping appraisal).
///
/// Variant order is the scale order, so `OrdinalLabel::VeryHigh > OrdinalLabel::Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OrdinalLabel {
    #[serde(rename = "VL")]
    VeryLow,
    #[serde(rename = "L")]
    Low,
    #[serde(rename = "M")]
    Medium,
    #[serde(rename = "H")]
    High,
    #[serde(rename = "VH")]
    VeryHigh,
}

impl OrdinalLabel {
    pub const ALL: [OrdinalLabel; 5] = [
        OrdinalLabel::VeryLow,
        OrdinalLabel::Low,
        OrdinalLabel::Medium,
        OrdinalLabel::High,
        OrdinalLabel::VeryHigh,
    ];

    /// The letter code used on the wire: `VL`, `L`, `M`, `H`, `VH`.
    pub fn code(&self) -> &'static str {
        match self {
            OrdinalLabel::VeryLow => "VL",
            OrdinalLabel::Low => "L",
            OrdinalLabel::Medium => "M",
            OrdinalLabel::High => "H",
            OrdinalLabel::VeryHigh => "VH",
        }
    }

    /// The long form used for inline semantic anchoring.
    pub fn describe(&self) -> &'static str {
        match self {
            OrdinalLabel::VeryLow => "Very Low",
            OrdinalLabel::Low => "Low",
            OrdinalLabel::Medium => "Medium",
            OrdinalLabel::High => "High",
            OrdinalLabel::VeryHigh => "Very High",
        }
    }

    /// Rendered as `M (Medium)`; small models lose bare letter-to-definition
    /// binding over long prompts.
    pub fn anchored(&self) -> String {
        format!("{} ({})", self.code(), self.describe())
    }

    /// Zero-based position on the scale.
    pub fn rank(&self) -> u8 {
        match self {
            OrdinalLabel::VeryLow => 0,
            OrdinalLabel::Low => 1,
            OrdinalLabel::Medium => 2,
            OrdinalLabel::High => 3,
            OrdinalLabel::VeryHigh => 4,
        }
    }
}

impl fmt::Display for OrdinalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(thiserror::Error, Debug)]
#[error("not an ordinal label: {0}")]
pub struct ParseLabelError(String);

impl FromStr for OrdinalLabel {
    type Err = ParseLabelError;

    /// Lenient parse: accepts letter codes, long forms and common variants
    /// regardless of case, separators and surrounding whitespace.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let folded: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match folded.as_str() {
            "vl" | "verylow" => Ok(OrdinalLabel::VeryLow),
            "l" | "low" => Ok(OrdinalLabel::Low),
            "m" | "medium" | "moderate" | "mid" => Ok(OrdinalLabel::Medium),
            "h" | "high" => Ok(OrdinalLabel::High),
            "vh" | "veryhigh" => Ok(OrdinalLabel::VeryHigh),
            _ => Err(ParseLabelError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_ordering() {
        assert!(OrdinalLabel::VeryHigh > OrdinalLabel::Medium);
        assert!(OrdinalLabel::VeryLow < OrdinalLabel::Low);
        assert_eq!(OrdinalLabel::High.rank(), 3);
    }

    #[test]
    fn test_lenient_parse() {
        assert_eq!("VH".parse::<OrdinalLabel>().unwrap(), OrdinalLabel::VeryHigh);
        assert_eq!("very high".parse::<OrdinalLabel>().unwrap(), OrdinalLabel::VeryHigh);
        assert_eq!("Very_Low".parse::<OrdinalLabel>().unwrap(), OrdinalLabel::VeryLow);
        assert_eq!(" moderate ".parse::<OrdinalLabel>().unwrap(), OrdinalLabel::Medium);
        assert!("extreme".parse::<OrdinalLabel>().is_err());
    }

    #[test]
    fn test_anchored_rendering() {
        assert_eq!(OrdinalLabel::Medium.anchored(), "M (Medium)");
        assert_eq!(OrdinalLabel::VeryHigh.anchored(), "VH (Very High)");
    }

    #[test]
    fn test_serde_codes() {
        let yaml = serde_yaml::to_string(&OrdinalLabel::VeryLow).unwrap();
        assert_eq!(yaml.trim(), "VL");
        let back: OrdinalLabel = serde_yaml::from_str("H").unwrap();
        assert_eq!(back, OrdinalLabel::High);
    }
}
