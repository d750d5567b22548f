use chrono::{DateTime, Utc};
use serde::Serialize;

use phasegate_config::{validate_confidence_threshold, validate_max_retry_attempts};
use phasegate_utils::error::PipelineError;
use phasegate_utils::subject::sanitize_subject;
use phasegate_utils::types::{RunDate, ValidationDepth};

/// One end-to-end execution of the four phases for a subject and date.
///
/// Construction validates every input, so a `PipelineRun` is always within
/// range. `current_attempt` is advanced only by the retry controller.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub subject: String,
    pub run_date: RunDate,
    pub execution_id: String,
    pub confidence_threshold: f64,
    pub max_retry_attempts: u32,
    pub current_attempt: u32,
    pub validation_depth: ValidationDepth,
    pub started_at: DateTime<Utc>,
}

impl PipelineRun {
    pub fn new(
        raw_subject: &str,
        run_date: RunDate,
        confidence_threshold: f64,
        max_retry_attempts: u32,
        validation_depth: ValidationDepth,
    ) -> Result<Self, PipelineError> {
        let subject = sanitize_subject(raw_subject)?;
        validate_confidence_threshold(confidence_threshold)?;
        validate_max_retry_attempts(max_retry_attempts)?;

        let started_at = Utc::now();
        Ok(Self {
            subject,
            run_date,
            execution_id: execution_id_for(started_at),
            confidence_threshold,
            max_retry_attempts,
            current_attempt: 0,
            validation_depth,
            started_at,
        })
    }

    /// Lock key shared by every run of the same subject and date.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}_{}", self.subject, self.run_date)
    }
}

fn execution_id_for(at: DateTime<Utc>) -> String {
    format!("{}-{}", at.format("%Y%m%dT%H%M%S%.3fZ"), std::process::id())
}
