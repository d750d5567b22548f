//! Confidence score extraction from structured artifacts.
//!
//! Candidate locations are an ordered table of accessors; the first one that
//! yields a parseable score in `[0, 10]` wins. A document without any such
//! value scores `0.0` with `found = false`.

use std::fs;

use camino::Utf8Path;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use phasegate_utils::error::ConfidenceError;

pub const MAX_SCORE: f64 = 10.0;

/// Score extracted from an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub score: f64,
    pub found: bool,
    /// Dotted location the score was read from
    pub source: Option<String>,
}

impl Confidence {
    #[must_use]
    pub const fn not_found() -> Self {
        Self {
            score: 0.0,
            found: false,
            source: None,
        }
    }

    #[must_use]
    pub fn passes(&self, threshold: f64) -> bool {
        self.score >= threshold
    }
}

type Accessor = fn(&Value) -> Option<&Value>;

fn at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(key))
}

fn overall_reliability(v: &Value) -> Option<&Value> {
    at(v, &["overall", "reliability_score"])
}

fn breakdown_overall(v: &Value) -> Option<&Value> {
    at(v, &["breakdown", "overall_confidence_score"])
}

fn quality_overall(v: &Value) -> Option<&Value> {
    at(v, &["quality", "overall_confidence"])
}

fn validation_overall(v: &Value) -> Option<&Value> {
    at(v, &["validation", "overall_confidence"])
}

fn top_confidence_score(v: &Value) -> Option<&Value> {
    v.get("confidence_score")
}

fn top_overall_confidence(v: &Value) -> Option<&Value> {
    v.get("overall_confidence")
}

/// Candidate locations in priority order. New schema variants are new rows.
static CANDIDATES: &[(&str, Accessor)] = &[
    ("overall.reliability_score", overall_reliability),
    ("breakdown.overall_confidence_score", breakdown_overall),
    ("quality.overall_confidence", quality_overall),
    ("validation.overall_confidence", validation_overall),
    ("confidence_score", top_confidence_score),
    ("overall_confidence", top_overall_confidence),
];

static SCORE_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)\s*(?:/\s*10(?:\.0+)?)?\s*$")
        .unwrap_or_else(|e| unreachable!("score pattern is valid: {e}"))
});

/// Parse a single candidate value: a number, or `"x.y"`, `"x.y/10"`, `"x.y/10.0"`.
#[must_use]
pub fn parse_score(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => SCORE_TEXT
            .captures(s)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())?,
        _ => return None,
    };
    (score.is_finite() && (0.0..=MAX_SCORE).contains(&score)).then_some(score)
}

/// Extract the confidence from an already parsed document.
#[must_use]
pub fn extract_from_value(document: &Value) -> Confidence {
    CANDIDATES
        .iter()
        .find_map(|(name, accessor)| {
            accessor(document).and_then(parse_score).map(|score| Confidence {
                score,
                found: true,
                source: Some((*name).to_string()),
            })
        })
        .unwrap_or_else(Confidence::not_found)
}

/// Extract the confidence from an artifact on disk.
///
/// Only an unreadable file is an error; malformed JSON scores zero.
pub fn extract_confidence(path: &Utf8Path) -> Result<Confidence, ConfidenceError> {
    let bytes = fs::read(path).map_err(|e| ConfidenceError::Unreadable {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(document) => Ok(extract_from_value(&document)),
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Artifact is not valid JSON; confidence defaults to 0.0");
            Ok(Confidence::not_found())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_reliability_score_string() {
        let c = extract_from_value(&json!({"overall": {"reliability_score": "9.2/10.0"}}));
        assert_eq!(c.score, 9.2);
        assert!(c.found);
        assert_eq!(c.source.as_deref(), Some("overall.reliability_score"));
    }

    #[test]
    fn test_breakdown_number() {
        let c = extract_from_value(&json!({"breakdown": {"overall_confidence_score": 8.95}}));
        assert_eq!(c.score, 8.95);
        assert!(c.found);
    }

    #[test]
    fn test_empty_document_fails_closed() {
        assert_eq!(extract_from_value(&json!({})), Confidence::not_found());
    }

    #[test]
    fn test_priority_order() {
        let doc = json!({
            "confidence_score": 5.0,
            "quality": {"overall_confidence": "9.1/10"},
        });
        let c = extract_from_value(&doc);
        assert_eq!(c.score, 9.1);
        assert_eq!(c.source.as_deref(), Some("quality.overall_confidence"));
    }

    #[test]
    fn test_out_of_range_candidate_is_skipped() {
        let doc = json!({
            "overall": {"reliability_score": 42},
            "overall_confidence": "9.5",
        });
        let c = extract_from_value(&doc);
        assert_eq!(c.score, 9.5);
        assert_eq!(c.source.as_deref(), Some("overall_confidence"));
    }

    #[test]
    fn test_parse_score_forms() {
        assert_eq!(parse_score(&json!("9.2/10.0")), Some(9.2));
        assert_eq!(parse_score(&json!("9.2/10")), Some(9.2));
        assert_eq!(parse_score(&json!("9.2")), Some(9.2));
        assert_eq!(parse_score(&json!(" 7 / 10 ")), Some(7.0));
        assert_eq!(parse_score(&json!("9.2/5")), None);
        assert_eq!(parse_score(&json!("high")), None);
        assert_eq!(parse_score(&json!(-1.0)), None);
        assert_eq!(parse_score(&json!(true)), None);
    }

    #[test]
    fn test_threshold_boundary_passes() {
        let c = Confidence {
            score: 9.0,
            found: true,
            source: None,
        };
        assert!(c.passes(9.0));
        assert!(!c.passes(9.01));
    }

    #[test]
    fn test_extract_from_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = camino::Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

        let good = dir.join("v.json");
        fs::write(&good, r#"{"validation":{"overall_confidence":9.4}}"#).unwrap();
        assert_eq!(extract_confidence(&good).unwrap().score, 9.4);

        let bad = dir.join("bad.json");
        fs::write(&bad, "not json").unwrap();
        assert_eq!(extract_confidence(&bad).unwrap(), Confidence::not_found());

        assert!(extract_confidence(&dir.join("missing.json")).is_err());
    }

    proptest! {
        #[test]
        fn prop_in_range_numbers_round_trip(score in 0.0f64..=10.0) {
            let c = extract_from_value(&json!({"confidence_score": score}));
            prop_assert!(c.found);
            prop_assert_eq!(c.score, score);
        }

        #[test]
        fn prop_formatted_strings_parse(whole in 0u32..10, tenth in 0u32..10) {
            let text = format!("{whole}.{tenth}/10.0");
            let expected: f64 = format!("{whole}.{tenth}").parse().unwrap();
            prop_assert_eq!(parse_score(&json!(text)), Some(expected));
        }

        #[test]
        fn prop_above_range_rejected(score in 10.001f64..1000.0) {
            prop_assert_eq!(parse_score(&json!(score)), None);
        }
    }
}
