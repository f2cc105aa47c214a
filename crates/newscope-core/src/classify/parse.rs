//! Tolerant parsing of the model's classification output.
//!
//! Accepts the requested bare JSON array, the JSON-mode wrapper object,
//! and either of those inside a fenced code block. Unknown fields are
//! ignored and missing ones default, so schema drift degrades gracefully.

use crate::error::LlmError;
use serde::Deserialize;

/// One classification as emitted by the model, before normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawClassification {
    /// The batch guid this classification refers to.
    #[serde(default)]
    pub guid: String,
    /// Relevance score as emitted (clamped later).
    #[serde(default)]
    pub score: f64,
    /// Short explanation of the score.
    #[serde(default)]
    pub explanation: String,
    /// Topic tags.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Article summary.
    #[serde(default)]
    pub summary: String,
}

#[derive(Deserialize)]
struct Wrapped {
    #[serde(default)]
    classifications: Vec<RawClassification>,
}

/// Parse model output into classifications.
pub fn parse_classifications(text: &str) -> Result<Vec<RawClassification>, LlmError> {
    let cleaned = strip_code_fences(text.trim());

    if let Ok(list) = serde_json::from_str::<Vec<RawClassification>>(cleaned) {
        return Ok(list);
    }
    if let Ok(wrapped) = serde_json::from_str::<Wrapped>(cleaned) {
        return Ok(wrapped.classifications);
    }
    // Some models wrap the array in prose; salvage the outermost array.
    if let (Some(start), Some(end)) = (cleaned.find('['), cleaned.rfind(']')) {
        if start < end {
            if let Ok(list) = serde_json::from_str::<Vec<RawClassification>>(&cleaned[start..=end])
            {
                return Ok(list);
            }
        }
    }

    Err(LlmError::Parse(
        "response is not a classification array".to_string(),
    ))
}

/// Clamp a model-emitted score into the valid [0, 10] range.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 10.0)
}

fn strip_code_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the fence line (possibly "```json") and the closing fence.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARRAY: &str = r#"[{"guid":"item-1","score":7,"explanation":"relevant","topics":["rust"],"summary":"Rust ships."}]"#;

    #[test]
    fn parses_bare_array() {
        let parsed = parse_classifications(ARRAY).expect("parse");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].guid, "item-1");
        assert_eq!(parsed[0].score, 7.0);
        assert_eq!(parsed[0].topics, vec!["rust"]);
    }

    #[test]
    fn parses_wrapped_object() {
        let text = format!("{{\"classifications\":{ARRAY}}}");
        let parsed = parse_classifications(&text).expect("parse");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].summary, "Rust ships.");
    }

    #[test]
    fn parses_fenced_output() {
        let text = format!("```json\n{ARRAY}\n```");
        let parsed = parse_classifications(&text).expect("parse");
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn salvages_array_embedded_in_prose() {
        let text = format!("Here are the classifications:\n{ARRAY}\nLet me know!");
        let parsed = parse_classifications(&text).expect("parse");
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn missing_fields_default() {
        let parsed = parse_classifications(r#"[{"guid":"item-2"}]"#).expect("parse");
        assert_eq!(parsed[0].score, 0.0);
        assert!(parsed[0].topics.is_empty());
        assert!(parsed[0].summary.is_empty());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = parse_classifications("I could not classify these articles.").unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)));
    }

    #[test]
    fn scores_clamp_into_range() {
        assert_eq!(clamp_score(15.0), 10.0);
        assert_eq!(clamp_score(-3.0), 0.0);
        assert_eq!(clamp_score(6.5), 6.5);
        assert_eq!(clamp_score(f64::NAN), 0.0);
    }
}
