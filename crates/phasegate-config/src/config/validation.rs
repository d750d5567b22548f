use phasegate_utils::error::ConfigError;
use phasegate_utils::types::PhaseId;

use super::Config;

pub const MIN_CONFIDENCE_THRESHOLD: f64 = 9.0;
pub const MAX_CONFIDENCE_THRESHOLD: f64 = 10.0;
pub const MAX_RETRY_ATTEMPTS_LIMIT: u32 = 5;

fn invalid(key: &str, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
    }
}

/// Check that a confidence threshold lies in `9.0..=10.0`.
pub fn validate_confidence_threshold(threshold: f64) -> Result<(), ConfigError> {
    if !threshold.is_finite()
        || !(MIN_CONFIDENCE_THRESHOLD..=MAX_CONFIDENCE_THRESHOLD).contains(&threshold)
    {
        return Err(invalid(
            "confidence_threshold",
            format!("{threshold} is outside {MIN_CONFIDENCE_THRESHOLD:.1}..={MAX_CONFIDENCE_THRESHOLD:.1}"),
        ));
    }
    Ok(())
}

/// Check that the retry bound lies in `1..=5`.
pub fn validate_max_retry_attempts(attempts: u32) -> Result<(), ConfigError> {
    if !(1..=MAX_RETRY_ATTEMPTS_LIMIT).contains(&attempts) {
        return Err(invalid(
            "max_retry_attempts",
            format!("{attempts} is outside 1..={MAX_RETRY_ATTEMPTS_LIMIT}"),
        ));
    }
    Ok(())
}

impl Config {
    /// Range-check every effective value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.defaults;

        if let Some(threshold) = d.confidence_threshold {
            validate_confidence_threshold(threshold)?;
        }
        if let Some(attempts) = d.max_retry_attempts {
            validate_max_retry_attempts(attempts)?;
        }
        if let Some(timeout) = d.phase_timeout
            && !(5..=7200).contains(&timeout)
        {
            return Err(invalid(
                "phase_timeout",
                format!("{timeout} must be between 5 and 7200 seconds"),
            ));
        }
        if let Some(delay) = d.retry_delay
            && delay > 600
        {
            return Err(invalid(
                "retry_delay",
                format!("{delay} must be at most 600 seconds"),
            ));
        }
        if let Some(ttl) = d.lock_ttl_seconds
            && !(60..=86_400).contains(&ttl)
        {
            return Err(invalid(
                "lock_ttl_seconds",
                format!("{ttl} must be between 60 and 86400 seconds"),
            ));
        }
        if let Some(root) = &d.output_root
            && root.trim().is_empty()
        {
            return Err(invalid("output_root", "must not be empty"));
        }
        if let Some(phases) = &d.retry_phases {
            if phases.is_empty() {
                return Err(invalid("retry_phases", "must name at least one phase"));
            }
            if let Some(phase) = phases.iter().find(|p| !p.content_kind().is_structured()) {
                return Err(invalid(
                    "retry_phases",
                    format!("{phase} produces free text and cannot be confidence-gated"),
                ));
            }
        }

        for phase in PhaseId::ALL {
            if let Some(task) = self.tasks.get(phase)
                && task.program.trim().is_empty()
            {
                return Err(invalid(
                    &format!("tasks.{phase}.program"),
                    "must not be empty",
                ));
            }
        }

        Ok(())
    }
}
