//! Configuration for phasegate runs
//!
//! Precedence is CLI arguments > `.phasegate/config.toml` > built-in
//! defaults, and every effective value remembers where it came from.

mod config;

pub use config::{
    CONFIG_DIR, CONFIG_FILE, CliArgs, Config, ConfigBuilder, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_LOCK_TTL_SECS,
    DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_OUTPUT_ROOT, DEFAULT_PHASE_TIMEOUT_SECS, DEFAULT_RETRY_DELAY_SECS,
    DEFAULT_TASK_PROGRAM, Defaults, MAX_CONFIDENCE_THRESHOLD, MAX_RETRY_ATTEMPTS_LIMIT, MIN_CONFIDENCE_THRESHOLD,
    TaskDefinition, TasksConfig, validate_confidence_threshold, validate_max_retry_attempts,
};
pub use phasegate_utils::types::ConfigSource;
