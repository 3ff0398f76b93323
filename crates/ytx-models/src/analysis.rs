//! Derived (LLM) analysis of a transcript.

use serde::{Deserialize, Serialize};

/// Structured analysis returned by the derivation step.
///
/// Every field defaults so that a partially-filled model response still
/// deserializes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<Framework>,
    #[serde(default, alias = "timestamps")]
    pub key_moments: Vec<TimestampNote>,
}

/// An actionable method described in the video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Framework {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<String>,
}

/// A key moment. Models return either a bare string or `{ "time", "note" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimestampNote {
    Plain(String),
    Timed {
        #[serde(default)]
        time: Option<String>,
        note: String,
    },
}

impl TimestampNote {
    pub fn render(&self) -> String {
        match self {
            TimestampNote::Plain(note) => note.clone(),
            TimestampNote::Timed { time: Some(time), note } => format!("[{}] {}", time, note),
            TimestampNote::Timed { time: None, note } => note.clone(),
        }
    }
}

impl Analysis {
    /// True when the model returned nothing usable.
    pub fn is_empty(&self) -> bool {
        self.summary.trim().is_empty()
            && self.key_insights.is_empty()
            && self.frameworks.is_empty()
            && self.key_moments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_response_deserializes() {
        let analysis: Analysis = serde_json::from_str(r#"{"summary":"s"}"#).unwrap();
        assert_eq!(analysis.summary, "s");
        assert!(analysis.key_insights.is_empty());
        assert!(!analysis.is_empty());
    }

    #[test]
    fn test_key_moments_accept_both_shapes() {
        let json = r#"{"key_moments":["intro",{"time":"01:02","note":"demo"}]}"#;
        let analysis: Analysis = serde_json::from_str(json).unwrap();
        let rendered: Vec<String> = analysis.key_moments.iter().map(|m| m.render()).collect();
        assert_eq!(rendered, vec!["intro", "[01:02] demo"]);
    }

    #[test]
    fn test_empty_analysis() {
        assert!(Analysis::default().is_empty());
    }
}
