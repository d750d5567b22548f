use std::time::Duration;

use phasegate_utils::error::ConfigError;
use phasegate_utils::types::{ConfigSource, PhaseId, ValidationDepth};

use super::{Config, TaskDefinition};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// ```rust,no_run
    /// use phasegate_config::Config;
    /// use std::time::Duration;
    ///
    /// let config = Config::builder()
    ///     .confidence_threshold(9.5)
    ///     .max_retry_attempts(2)
    ///     .retry_delay(Duration::ZERO)
    ///     .output_root("/tmp/phasegate")
    ///     .build()
    ///     .expect("valid config");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for [`Config`] that skips file discovery entirely.
///
/// Values set here are attributed to [`ConfigSource::Programmatic`]; anything
/// left unset keeps the built-in default. `build` runs the same validation as
/// discovery.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    confidence_threshold: Option<f64>,
    max_retry_attempts: Option<u32>,
    phase_timeout: Option<Duration>,
    retry_delay: Option<Duration>,
    output_root: Option<String>,
    validation_depth: Option<ValidationDepth>,
    glob_fallback: Option<bool>,
    retry_phases: Option<Vec<PhaseId>>,
    lock_ttl_seconds: Option<u64>,
    tasks: Vec<(PhaseId, TaskDefinition)>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = Some(attempts);
        self
    }

    #[must_use]
    pub fn phase_timeout(mut self, timeout: Duration) -> Self {
        self.phase_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn output_root(mut self, root: impl Into<String>) -> Self {
        self.output_root = Some(root.into());
        self
    }

    #[must_use]
    pub fn validation_depth(mut self, depth: ValidationDepth) -> Self {
        self.validation_depth = Some(depth);
        self
    }

    #[must_use]
    pub fn glob_fallback(mut self, enabled: bool) -> Self {
        self.glob_fallback = Some(enabled);
        self
    }

    #[must_use]
    pub fn retry_phases(mut self, phases: impl IntoIterator<Item = PhaseId>) -> Self {
        self.retry_phases = Some(phases.into_iter().collect());
        self
    }

    #[must_use]
    pub fn lock_ttl_seconds(mut self, ttl: u64) -> Self {
        self.lock_ttl_seconds = Some(ttl);
        self
    }

    /// Override the external task for one phase.
    #[must_use]
    pub fn task(mut self, phase: PhaseId, task: TaskDefinition) -> Self {
        self.tasks.push((phase, task));
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut config = Config::default();
        let source = ConfigSource::Programmatic;
        let mut mark = |key: &str| {
            config
                .source_attribution
                .insert(key.to_string(), source.clone());
        };

        if self.confidence_threshold.is_some() {
            mark("confidence_threshold");
        }
        if self.max_retry_attempts.is_some() {
            mark("max_retry_attempts");
        }
        if self.phase_timeout.is_some() {
            mark("phase_timeout");
        }
        if self.retry_delay.is_some() {
            mark("retry_delay");
        }
        if self.output_root.is_some() {
            mark("output_root");
        }
        if self.validation_depth.is_some() {
            mark("validation_depth");
        }
        if self.glob_fallback.is_some() {
            mark("glob_fallback");
        }
        if self.retry_phases.is_some() {
            mark("retry_phases");
        }
        if self.lock_ttl_seconds.is_some() {
            mark("lock_ttl_seconds");
        }

        let defaults = &mut config.defaults;
        if let Some(v) = self.confidence_threshold {
            defaults.confidence_threshold = Some(v);
        }
        if let Some(v) = self.max_retry_attempts {
            defaults.max_retry_attempts = Some(v);
        }
        if let Some(v) = self.phase_timeout {
            defaults.phase_timeout = Some(v.as_secs());
        }
        if let Some(v) = self.retry_delay {
            defaults.retry_delay = Some(v.as_secs());
        }
        if let Some(v) = self.output_root {
            defaults.output_root = Some(v);
        }
        if let Some(v) = self.validation_depth {
            defaults.validation_depth = Some(v);
        }
        if let Some(v) = self.glob_fallback {
            defaults.glob_fallback = Some(v);
        }
        if let Some(v) = self.retry_phases {
            defaults.retry_phases = Some(v);
        }
        if let Some(v) = self.lock_ttl_seconds {
            defaults.lock_ttl_seconds = Some(v);
        }
        for (phase, task) in self.tasks {
            config.tasks.set(phase, task);
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_builder_sets_values_and_attribution() {
        let config = Config::builder()
            .confidence_threshold(9.8)
            .max_retry_attempts(1)
            .retry_delay(Duration::ZERO)
            .output_root("out")
            .build()
            .unwrap();

        assert_eq!(config.confidence_threshold(), 9.8);
        assert_eq!(config.max_retry_attempts(), 1);
        assert_eq!(config.retry_delay(), Duration::ZERO);
        assert_eq!(config.output_root().as_str(), "out");
        assert_eq!(
            config.source_of("confidence_threshold"),
            ConfigSource::Programmatic
        );
        assert_eq!(config.source_of("phase_timeout"), ConfigSource::Default);
    }

    #[test]
    fn test_builder_task_override() {
        let config = Config::builder()
            .task(
                PhaseId::Validation,
                TaskDefinition {
                    program: "./validate.sh".to_string(),
                    args: vec!["{output}".to_string()],
                    env: BTreeMap::new(),
                },
            )
            .build()
            .unwrap();
        assert_eq!(config.task_for(PhaseId::Validation).program, "./validate.sh");
    }

    #[test]
    fn test_builder_validates() {
        let err = Config::builder().max_retry_attempts(0).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "max_retry_attempts"));
    }
}
