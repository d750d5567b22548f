//! Shared helpers for CLI commands: store construction and error reporting.

use serde::Serialize;

use phasegate_config::Config;
use phasegate_engine::ArtifactStore;
use phasegate_utils::error::PipelineError;
use phasegate_utils::exit_codes::{ExitCode, error_to_exit_code_and_kind};
use phasegate_utils::subject::sanitize_subject;
use phasegate_utils::types::{ErrorKind, RunDate};

use super::json_emit::emit_error_json;

/// Machine-readable failure printed on stdout when `--json` is set.
#[derive(Debug, Serialize)]
pub struct ErrorJsonOutput {
    pub schema_version: &'static str,
    pub operation: String,
    pub error_kind: ErrorKind,
    pub exit_code: i32,
    pub message: String,
}

/// Artifact store rooted at the configured output directory.
pub fn store_for(config: &Config) -> ArtifactStore {
    ArtifactStore::new(config.output_root()).with_glob_fallback(config.glob_fallback())
}

/// Normalize a raw subject and pick the date (today when not given).
pub fn resolve_target(subject: &str, date: Option<RunDate>) -> Result<(String, RunDate), PipelineError> {
    let subject = sanitize_subject(subject)?;
    Ok((subject, date.unwrap_or_else(RunDate::today)))
}

/// Print a library error with context and suggestions (or as JSON).
pub fn report_error(error: &PipelineError, operation: &str, json: bool) {
    let (exit_code, error_kind) = error_to_exit_code_and_kind(error);
    if json {
        let output = ErrorJsonOutput {
            schema_version: "1",
            operation: operation.to_string(),
            error_kind,
            exit_code: exit_code.as_i32(),
            message: error.to_string(),
        };
        match emit_error_json(&output) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("✗ Failed to emit error JSON: {e:#}"),
        }
        return;
    }
    eprintln!("✗ {operation} failed\n");
    eprint!("{}", error.display_for_user());
}

/// Print an error that did not come from the pipeline library.
pub fn report_unexpected(error: &anyhow::Error, json: bool) {
    if json {
        let output = ErrorJsonOutput {
            schema_version: "1",
            operation: "internal".to_string(),
            error_kind: ErrorKind::Unknown,
            exit_code: ExitCode::INTERNAL.as_i32(),
            message: format!("{error:#}"),
        };
        if let Ok(line) = emit_error_json(&output) {
            println!("{line}");
            return;
        }
    }
    eprintln!("✗ Unexpected error: {error:#}");
    eprintln!("\n  Run with --verbose for more detailed output");
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasegate_utils::error::SubjectError;

    #[test]
    fn test_resolve_target_normalizes_subject() {
        let date = RunDate::parse("20250101").unwrap();
        let (subject, resolved) = resolve_target(" acme ", Some(date)).unwrap();
        assert_eq!(subject, "ACME");
        assert_eq!(resolved, date);
    }

    #[test]
    fn test_resolve_target_rejects_empty_subject() {
        let err = resolve_target("   ", None).unwrap_err();
        assert!(matches!(err, PipelineError::Subject(SubjectError::Empty)));
    }

    #[test]
    fn test_error_json_shape() {
        let output = ErrorJsonOutput {
            schema_version: "1",
            operation: "run".to_string(),
            error_kind: ErrorKind::LockHeld,
            exit_code: 10,
            message: "locked".to_string(),
        };
        let json = emit_error_json(&output).unwrap();
        assert_eq!(
            json,
            r#"{"error_kind":"lock_held","exit_code":10,"message":"locked","operation":"run","schema_version":"1"}"#
        );
    }
}
