//! Fixture builders shared by unit and integration tests.
//!
//! Content produced here is deterministic so tests can compare bytes.

use serde_json::{Map, Value, json};

use crate::types::PhaseId;

/// Validation document scoring `score` in the primary confidence location.
#[must_use]
pub fn validation_report(score: f64) -> String {
    json!({
        "overall": {
            "reliability_score": score,
            "verdict": if score >= 9.0 { "publishable" } else { "needs_revision" },
        },
        "checks": [
            {"name": "source_coverage", "passed": true},
            {"name": "numeric_consistency", "passed": score >= 9.0},
        ],
    })
    .to_string()
}

/// Validation document with `value` placed at the dotted `path`
/// (e.g. `"quality.overall_confidence"`).
#[must_use]
pub fn validation_report_at(path: &str, value: Value) -> String {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = value;
    for segment in segments.iter().rev() {
        let mut map = Map::new();
        map.insert((*segment).to_string(), current);
        current = Value::Object(map);
    }
    current.to_string()
}

/// Plausible artifact content for any phase.
#[must_use]
pub fn phase_artifact(phase: PhaseId, subject: &str) -> String {
    match phase {
        PhaseId::Discovery => json!({
            "subject": subject,
            "sources": ["annual_report", "press_releases"],
            "facts": [{"key": "founded", "value": "1999"}],
        })
        .to_string(),
        PhaseId::Analysis => json!({
            "subject": subject,
            "findings": [{"topic": "margins", "assessment": "stable"}],
            "breakdown": {"overall_confidence_score": "8.7/10"},
        })
        .to_string(),
        PhaseId::Synthesis => format!(
            "# {subject} report\n\n## Summary\n\nMargins are stable.\n\n## Risks\n\n- Concentration\n"
        ),
        PhaseId::Validation => validation_report(9.3),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_report_has_primary_location() {
        let value: Value = serde_json::from_str(&validation_report(9.5)).unwrap();
        assert_eq!(value["overall"]["reliability_score"], json!(9.5));
    }

    #[test]
    fn test_validation_report_at_nests_path() {
        let doc = validation_report_at("quality.overall_confidence", json!("9.2/10"));
        let value: Value = serde_json::from_str(&doc).unwrap();
        assert_eq!(value["quality"]["overall_confidence"], json!("9.2/10"));
    }

    #[test]
    fn test_structured_phase_artifacts_parse() {
        for phase in PhaseId::ALL {
            let content = phase_artifact(phase, "ACME");
            if phase.content_kind().is_structured() {
                assert!(serde_json::from_str::<Value>(&content).is_ok(), "{phase}");
            } else {
                assert!(content.starts_with("# ACME"));
            }
        }
    }
}
