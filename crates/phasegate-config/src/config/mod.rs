mod builder;
mod discovery;
mod model;
mod sources;
mod validation;

use camino::Utf8PathBuf;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use phasegate_utils::types::{ConfigSource, PhaseId, ValidationDepth};

pub use builder::ConfigBuilder;
pub use model::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_LOCK_TTL_SECS, DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_OUTPUT_ROOT,
    DEFAULT_PHASE_TIMEOUT_SECS, DEFAULT_RETRY_DELAY_SECS, DEFAULT_TASK_PROGRAM, Defaults, TaskDefinition,
    TasksConfig,
};
pub use validation::{
    MAX_CONFIDENCE_THRESHOLD, MAX_RETRY_ATTEMPTS_LIMIT, MIN_CONFIDENCE_THRESHOLD, validate_confidence_threshold,
    validate_max_retry_attempts,
};
pub use discovery::{CONFIG_DIR, CONFIG_FILE};

/// Effective configuration for phasegate.
///
/// Built by [`Config::discover`] (CLI > config file > defaults) or by
/// [`Config::builder`] for programmatic use. The typed accessors always
/// return a value; missing entries fall back to the built-in defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub defaults: Defaults,
    pub tasks: TasksConfig,
    /// Configuration file that was loaded, if any
    pub config_file: Option<PathBuf>,
    /// Where each effective value came from, keyed by option name
    pub source_attribution: HashMap<String, ConfigSource>,
}

/// Command-line overrides fed into configuration discovery.
///
/// `None` means "not given on the command line".
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub confidence_threshold: Option<f64>,
    pub max_retry_attempts: Option<u32>,
    pub phase_timeout: Option<u64>,
    pub retry_delay: Option<u64>,
    pub output_root: Option<String>,
    pub validation_depth: Option<ValidationDepth>,
    pub glob_fallback: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        let mut source_attribution = HashMap::new();
        for key in Self::KEYS {
            source_attribution.insert((*key).to_string(), ConfigSource::Default);
        }
        Self {
            defaults: Defaults::default(),
            tasks: TasksConfig::default(),
            config_file: None,
            source_attribution,
        }
    }
}

impl Config {
    /// Option names tracked for source attribution.
    pub const KEYS: &'static [&'static str] = &[
        "confidence_threshold",
        "max_retry_attempts",
        "phase_timeout",
        "retry_delay",
        "output_root",
        "validation_depth",
        "glob_fallback",
        "retry_phases",
        "lock_ttl_seconds",
    ];

    #[must_use]
    pub fn confidence_threshold(&self) -> f64 {
        self.defaults
            .confidence_threshold
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD)
    }

    #[must_use]
    pub fn max_retry_attempts(&self) -> u32 {
        self.defaults
            .max_retry_attempts
            .unwrap_or(DEFAULT_MAX_RETRY_ATTEMPTS)
    }

    #[must_use]
    pub fn phase_timeout(&self) -> Duration {
        Duration::from_secs(self.defaults.phase_timeout.unwrap_or(DEFAULT_PHASE_TIMEOUT_SECS))
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.defaults.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY_SECS))
    }

    #[must_use]
    pub fn output_root(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(
            self.defaults
                .output_root
                .as_deref()
                .unwrap_or(DEFAULT_OUTPUT_ROOT),
        )
    }

    #[must_use]
    pub fn validation_depth(&self) -> ValidationDepth {
        self.defaults.validation_depth.unwrap_or_default()
    }

    #[must_use]
    pub fn glob_fallback(&self) -> bool {
        self.defaults.glob_fallback.unwrap_or(false)
    }

    /// Phases whose artifact goes through the confidence gate.
    #[must_use]
    pub fn retry_phases(&self) -> Vec<PhaseId> {
        self.defaults
            .retry_phases
            .clone()
            .unwrap_or_else(|| vec![PhaseId::Validation])
    }

    #[must_use]
    pub fn lock_ttl_seconds(&self) -> u64 {
        self.defaults.lock_ttl_seconds.unwrap_or(DEFAULT_LOCK_TTL_SECS)
    }

    /// Task definition for `phase` (configured or built-in).
    #[must_use]
    pub fn task_for(&self, phase: PhaseId) -> TaskDefinition {
        self.tasks.task_for(phase)
    }

    #[must_use]
    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.source_attribution
            .get(key)
            .cloned()
            .unwrap_or(ConfigSource::Default)
    }
}
