use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use phasegate_utils::types::{PhaseId, ValidationDepth};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 9.0;
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_PHASE_TIMEOUT_SECS: u64 = 900;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 30;
pub const DEFAULT_OUTPUT_ROOT: &str = "outputs";
pub const DEFAULT_LOCK_TTL_SECS: u64 = 3600;

/// Program invoked for phases without a `[tasks.<phase>]` table.
pub const DEFAULT_TASK_PROGRAM: &str = "claude";

/// `[defaults]` section of the configuration file.
///
/// Every field is optional in the file; [`Defaults::default`] holds the
/// built-in values that apply when neither the file nor the CLI sets one.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    pub confidence_threshold: Option<f64>,
    pub max_retry_attempts: Option<u32>,
    /// Per-phase wall-clock timeout in seconds
    pub phase_timeout: Option<u64>,
    /// Delay between retry attempts in seconds
    pub retry_delay: Option<u64>,
    pub output_root: Option<String>,
    pub validation_depth: Option<ValidationDepth>,
    /// Accept differently named task outputs via glob discovery
    pub glob_fallback: Option<bool>,
    /// Phases whose artifact is confidence-gated
    pub retry_phases: Option<Vec<PhaseId>>,
    pub lock_ttl_seconds: Option<u64>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            confidence_threshold: Some(DEFAULT_CONFIDENCE_THRESHOLD),
            max_retry_attempts: Some(DEFAULT_MAX_RETRY_ATTEMPTS),
            phase_timeout: Some(DEFAULT_PHASE_TIMEOUT_SECS),
            retry_delay: Some(DEFAULT_RETRY_DELAY_SECS),
            output_root: Some(DEFAULT_OUTPUT_ROOT.to_string()),
            validation_depth: Some(ValidationDepth::Standard),
            glob_fallback: Some(false),
            retry_phases: Some(vec![PhaseId::Validation]),
            lock_ttl_seconds: Some(DEFAULT_LOCK_TTL_SECS),
        }
    }
}

/// External task definition for one phase (`[tasks.<phase>]`).
///
/// `args` and `env` values may contain placeholders such as `{subject}`,
/// `{date}`, `{phase}`, `{output}`, `{staging}`, `{output_dir}`,
/// `{execution_id}` and `{validation_depth}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TaskDefinition {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl TaskDefinition {
    /// Built-in task: `claude -p "/<phase> {subject} {date}"`.
    #[must_use]
    pub fn default_for(phase: PhaseId) -> Self {
        Self {
            program: DEFAULT_TASK_PROGRAM.to_string(),
            args: vec!["-p".to_string(), format!("/{phase} {{subject}} {{date}}")],
            env: BTreeMap::new(),
        }
    }
}

/// `[tasks]` section: optional per-phase overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TasksConfig {
    pub discovery: Option<TaskDefinition>,
    pub analysis: Option<TaskDefinition>,
    pub synthesis: Option<TaskDefinition>,
    pub validation: Option<TaskDefinition>,
}

impl TasksConfig {
    #[must_use]
    pub fn get(&self, phase: PhaseId) -> Option<&TaskDefinition> {
        match phase {
            PhaseId::Discovery => self.discovery.as_ref(),
            PhaseId::Analysis => self.analysis.as_ref(),
            PhaseId::Synthesis => self.synthesis.as_ref(),
            PhaseId::Validation => self.validation.as_ref(),
        }
    }

    pub fn set(&mut self, phase: PhaseId, task: TaskDefinition) {
        let slot = match phase {
            PhaseId::Discovery => &mut self.discovery,
            PhaseId::Analysis => &mut self.analysis,
            PhaseId::Synthesis => &mut self.synthesis,
            PhaseId::Validation => &mut self.validation,
        };
        *slot = Some(task);
    }

    /// Configured task for `phase`, or the built-in default.
    #[must_use]
    pub fn task_for(&self, phase: PhaseId) -> TaskDefinition {
        self.get(phase)
            .cloned()
            .unwrap_or_else(|| TaskDefinition::default_for(phase))
    }
}
