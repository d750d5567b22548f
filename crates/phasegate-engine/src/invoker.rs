//! Launching the external task behind each phase.
//!
//! [`TaskInvoker`] is the seam between phase execution and whatever
//! produces the artifact. [`ExternalTaskInvoker`] runs the configured
//! program through [`NativeRunner`]; tests substitute a recording mock.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use phasegate_config::{Config, TaskDefinition, TasksConfig};
use phasegate_runner::{CommandSpec, NativeRunner, RunnerError};
use phasegate_utils::error::PrerequisiteError;
use phasegate_utils::types::{PhaseId, RunDate, ValidationDepth};

/// Characters of stderr kept for error messages.
pub const STDERR_TAIL_CHARS: usize = 2048;

/// Everything a task needs to know about the artifact it must produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub phase: PhaseId,
    pub subject: String,
    pub date: RunDate,
    pub execution_id: String,
    pub validation_depth: ValidationDepth,
    /// Final artifact path
    pub output: Utf8PathBuf,
    /// Staging path the task may write instead
    pub staging: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    /// 0 for the first run of a phase, then 1.. for retries
    pub attempt: u32,
}

impl TaskRequest {
    /// Placeholder name/value pairs used for argv expansion and environment.
    #[must_use]
    pub fn placeholders(&self) -> Vec<(&'static str, String)> {
        vec![
            ("subject", self.subject.clone()),
            ("date", self.date.to_string()),
            ("phase", self.phase.to_string()),
            ("output", self.output.to_string()),
            ("staging", self.staging.to_string()),
            ("output_dir", self.output_dir.to_string()),
            ("execution_id", self.execution_id.clone()),
            ("validation_depth", self.validation_depth.to_string()),
            ("attempt", self.attempt.to_string()),
        ]
    }

    /// Replace every `{name}` placeholder in `template`.
    #[must_use]
    pub fn expand(&self, template: &str) -> String {
        self.placeholders()
            .iter()
            .fold(template.to_string(), |acc, (name, value)| {
                acc.replace(&format!("{{{name}}}"), value)
            })
    }
}

/// Result of a task that ran to completion (successfully or not).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr_tail: String,
    pub duration: Duration,
}

impl TaskOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Failures that prevented a task from running to completion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    #[error("Failed to start task program '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("Task exceeded its {timeout_ms} ms timeout")]
    Timeout { timeout_ms: u64 },

    #[error("Task was cancelled")]
    Cancelled,

    #[error("Task execution failed: {0}")]
    Other(String),
}

impl From<RunnerError> for InvokeError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::SpawnFailed { program, reason } => Self::Spawn { program, reason },
            RunnerError::Timeout { timeout_ms } => Self::Timeout { timeout_ms },
            RunnerError::Cancelled => Self::Cancelled,
            RunnerError::WaitFailed { reason } => Self::Other(reason),
        }
    }
}

#[async_trait]
pub trait TaskInvoker: Send + Sync {
    /// Run the task for `request`, waiting at most `timeout`.
    ///
    /// A non-zero exit is reported through [`TaskOutput::exit_code`], not as
    /// an error. The produced file is not interpreted here.
    async fn invoke(
        &self,
        request: &TaskRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<TaskOutput, InvokeError>;

    /// Verify that the tasks for `phases` can be started at all.
    fn check_prerequisites(&self, _phases: &[PhaseId]) -> Result<(), PrerequisiteError> {
        Ok(())
    }
}

/// Runs the configured program for each phase.
#[derive(Debug, Clone)]
pub struct ExternalTaskInvoker {
    tasks: TasksConfig,
    runner: NativeRunner,
}

impl ExternalTaskInvoker {
    #[must_use]
    pub fn new(tasks: TasksConfig) -> Self {
        Self {
            tasks,
            runner: NativeRunner::new(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.tasks.clone())
    }

    #[must_use]
    pub fn task(&self, phase: PhaseId) -> TaskDefinition {
        self.tasks.task_for(phase)
    }

    /// Argv-only command for `request`: placeholders expanded in args and
    /// env values, plus `PHASEGATE_*` variables for every placeholder.
    #[must_use]
    pub fn command_for(&self, request: &TaskRequest) -> CommandSpec {
        let task = self.task(request.phase);
        let mut spec = CommandSpec::new(request.expand(&task.program))
            .args(task.args.iter().map(|a| request.expand(a)));

        for (name, value) in request.placeholders() {
            spec = spec.env(format!("PHASEGATE_{}", name.to_ascii_uppercase()), value);
        }
        for (key, value) in &task.env {
            spec = spec.env(key, request.expand(value));
        }
        spec
    }
}

#[async_trait]
impl TaskInvoker for ExternalTaskInvoker {
    async fn invoke(
        &self,
        request: &TaskRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<TaskOutput, InvokeError> {
        let spec = self.command_for(request);
        debug!(phase = %request.phase, command = %spec.display_line(), "Invoking external task");

        let output = self.runner.run(&spec, timeout, cancel).await?;
        Ok(TaskOutput {
            exit_code: output.exit_code,
            stdout: output.stdout_string(),
            stderr_tail: output.stderr_tail(STDERR_TAIL_CHARS),
            duration: output.duration,
        })
    }

    fn check_prerequisites(&self, phases: &[PhaseId]) -> Result<(), PrerequisiteError> {
        for &phase in phases {
            let program = self.task(phase).program;
            if !program_available(&program) {
                return Err(PrerequisiteError::TaskProgramNotFound { phase, program });
            }
        }
        Ok(())
    }
}

/// Programs given as a path must exist; bare names are looked up on `PATH`.
fn program_available(program: &str) -> bool {
    let path = Path::new(program);
    if path.components().count() > 1 || path.is_absolute() {
        return path.is_file();
    }
    which::which(program).is_ok()
}
