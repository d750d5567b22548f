use std::fmt;
use std::io;
use thiserror::Error;

pub use phasegate_lock::LockError;

use crate::types::PhaseId;

/// Library-level error type with rich context and user-friendly reporting.
///
/// `PipelineError` is returned by every fallible pipeline operation. It provides:
/// - Detailed error information for programmatic handling
/// - User-friendly messages with context and suggestions
/// - Mapping to CLI exit codes via [`to_exit_code()`](Self::to_exit_code)
///
/// # Error Categories
///
/// | Category | Description |
/// |----------|-------------|
/// | `Config` | Bad CLI input or configuration file |
/// | `Subject` | Subject identifier could not be normalized |
/// | `Prerequisite` | Missing task program or output directories |
/// | `Phase` | Dependency gap, task failure, or artifact problem |
/// | `Confidence` | Gated artifact could not be read |
/// | `Lock` | Another run holds the same subject/date |
///
/// A confidence shortfall after exhausted retries is not an error; it is
/// reported through the run summary instead.
///
/// Library code returns `PipelineError` and does NOT call `std::process::exit()`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Subject validation error: {0}")]
    Subject(#[from] SubjectError),

    #[error("Prerequisite error: {0}")]
    Prerequisite(#[from] PrerequisiteError),

    #[error("Phase execution error: {0}")]
    Phase(#[from] PhaseError),

    #[error("Confidence extraction error: {0}")]
    Confidence(#[from] ConfidenceError),

    #[error("Run lock error: {0}")]
    Lock(#[from] LockError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Run summary write failed at {path}: {reason}")]
    SummaryWriteFailed { path: String, reason: String },

    #[error("Run was interrupted before {stage}")]
    Interrupted { stage: String },
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    PhaseExecution,
    ExternalTask,
    FileSystem,
    Concurrency,
    Validation,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::PhaseExecution => write!(f, "Phase Execution"),
            Self::ExternalTask => write!(f, "External Task"),
            Self::FileSystem => write!(f, "File System"),
            Self::Concurrency => write!(f, "Concurrency"),
            Self::Validation => write!(f, "Validation"),
        }
    }
}

// ============================================================================
// Configuration and input errors
// ============================================================================

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => {
                format!("Configuration file not found: {path}")
            }
            Self::DiscoveryFailed { reason } => {
                format!("Failed to discover configuration: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) => Some(
                "Configuration files must be valid TOML with optional [defaults] and [tasks.<phase>] sections."
                    .to_string(),
            ),
            Self::InvalidValue { key, .. } => Some(format!(
                "The '{key}' option is range-checked before any phase runs."
            )),
            Self::NotFound { .. } | Self::DiscoveryFailed { .. } => Some(
                "phasegate searches for .phasegate/config.toml starting from the current directory upward."
                    .to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax of the configuration file".to_string(),
                "Remove unknown sections or keys".to_string(),
            ],
            Self::InvalidValue { key, .. } => match key.as_str() {
                "confidence_threshold" => vec![
                    "Use a confidence threshold between 9.0 and 10.0 inclusive".to_string(),
                    "Example: --confidence 9.5".to_string(),
                ],
                "max_retry_attempts" => vec![
                    "Use a retry bound between 1 and 5".to_string(),
                    "Example: --retry 3".to_string(),
                ],
                "date" => vec![
                    "Pass the run date as YYYYMMDD, e.g. --date 20250101".to_string(),
                    "Omit --date to use today's date".to_string(),
                ],
                "validation_depth" => vec![
                    "Use one of: standard, comprehensive, institutional".to_string(),
                ],
                _ => vec![
                    "Check the documentation for valid values for this option".to_string(),
                    "Remove the option to use the default value".to_string(),
                ],
            },
            Self::NotFound { .. } => vec![
                "Create .phasegate/config.toml in your project root".to_string(),
                "Check the path passed to --config".to_string(),
            ],
            Self::DiscoveryFailed { .. } => vec![
                "Check read permissions on the current directory and its parents".to_string(),
                "Use --config <path> to specify configuration file explicitly".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Error type for subject identifier validation failures
#[derive(Debug, Error)]
pub enum SubjectError {
    #[error("Subject is empty after normalization")]
    Empty,

    #[error("Subject contains only invalid characters")]
    OnlyInvalidCharacters,

    #[error("Subject is {length} characters long (maximum {max})")]
    TooLong { length: usize, max: usize },
}

impl UserFriendlyError for SubjectError {
    fn user_message(&self) -> String {
        match self {
            Self::Empty => "The subject is empty or contains no valid characters".to_string(),
            Self::OnlyInvalidCharacters => {
                "The subject contains only invalid characters (no letters, digits, dots, or dashes)"
                    .to_string()
            }
            Self::TooLong { length, max } => {
                format!("The subject is too long ({length} characters, maximum {max})")
            }
        }
    }

    fn context(&self) -> Option<String> {
        Some("Subjects are used in artifact file names. Only ASCII letters, digits, dots (.), dashes (-), and underscores (_) are kept; letters are uppercased.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Empty | Self::OnlyInvalidCharacters => vec![
                "Provide a subject such as a ticker symbol, e.g. ACME".to_string(),
                "Valid characters: A-Z, 0-9, . (dot), - (dash), _ (underscore)".to_string(),
            ],
            Self::TooLong { max, .. } => vec![format!("Shorten the subject to at most {max} characters")],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Validation
    }
}

/// Missing tools or directories required before the first phase starts
#[derive(Debug, Error)]
pub enum PrerequisiteError {
    #[error("Task program '{program}' for phase {phase} was not found on PATH")]
    TaskProgramNotFound { phase: PhaseId, program: String },

    #[error("Failed to create output directory {path}: {reason}")]
    DirectoryCreation { path: String, reason: String },
}

impl UserFriendlyError for PrerequisiteError {
    fn user_message(&self) -> String {
        match self {
            Self::TaskProgramNotFound { phase, program } => {
                format!("Cannot run the {phase} phase: program '{program}' is not installed or not on PATH")
            }
            Self::DirectoryCreation { path, reason } => {
                format!("Could not create output directory {path}: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::TaskProgramNotFound { .. } => Some(
                "Each phase runs an external task program configured under [tasks.<phase>].".to_string(),
            ),
            Self::DirectoryCreation { .. } => Some(
                "Every phase writes into its own directory under the output root.".to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::TaskProgramNotFound { phase, .. } => vec![
                "Install the task program or add it to PATH".to_string(),
                format!("Set [tasks.{phase}].program in .phasegate/config.toml to an absolute path"),
            ],
            Self::DirectoryCreation { .. } => vec![
                "Check write permissions on the output root".to_string(),
                "Use --output-root to choose a writable location".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::FileSystem
    }
}

// ============================================================================
// Phase errors
// ============================================================================

/// Phase execution errors; every variant names the phase it happened in
#[derive(Error, Debug)]
pub enum PhaseError {
    #[error("Phase {phase} dependency not satisfied: {dependency} artifact {path} {reason}")]
    DependencyNotSatisfied {
        phase: PhaseId,
        dependency: PhaseId,
        path: String,
        reason: String,
    },

    #[error("Phase {phase} task failed (exit code {}): {stderr_tail}", display_code(*exit_code))]
    TaskFailed {
        phase: PhaseId,
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    #[error("Phase {phase} timed out after {}", display_timeout(*timeout_ms))]
    Timeout { phase: PhaseId, timeout_ms: u64 },

    #[error("Phase {phase} produced no artifact; expected {expected}")]
    ArtifactNotProduced { phase: PhaseId, expected: String },

    #[error("Phase {phase} artifact {path} is invalid: {reason}")]
    ArtifactInvalid {
        phase: PhaseId,
        path: String,
        reason: String,
    },

    #[error("Phase {phase} artifact store operation failed on {path}: {reason}")]
    StoreFailed {
        phase: PhaseId,
        path: String,
        reason: String,
    },

    #[error("Phase {phase} was cancelled")]
    Cancelled { phase: PhaseId },
}

fn display_code(code: Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Whole seconds when exact, milliseconds otherwise.
fn display_timeout(timeout_ms: u64) -> String {
    if timeout_ms % 1000 == 0 {
        format!("{} seconds", timeout_ms / 1000)
    } else {
        format!("{timeout_ms} ms")
    }
}

impl PhaseError {
    /// The phase this error belongs to.
    #[must_use]
    pub const fn phase(&self) -> PhaseId {
        match self {
            Self::DependencyNotSatisfied { phase, .. }
            | Self::TaskFailed { phase, .. }
            | Self::Timeout { phase, .. }
            | Self::ArtifactNotProduced { phase, .. }
            | Self::ArtifactInvalid { phase, .. }
            | Self::StoreFailed { phase, .. }
            | Self::Cancelled { phase } => *phase,
        }
    }

    /// Whether a retry attempt may absorb this error instead of aborting the run.
    ///
    /// Task and artifact failures consume an attempt; dependency gaps,
    /// store failures, and cancellation stay fatal.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TaskFailed { .. }
                | Self::Timeout { .. }
                | Self::ArtifactNotProduced { .. }
                | Self::ArtifactInvalid { .. }
        )
    }
}

impl UserFriendlyError for PhaseError {
    fn user_message(&self) -> String {
        match self {
            Self::DependencyNotSatisfied {
                phase,
                dependency,
                path,
                reason,
            } => format!(
                "Cannot run {phase} phase: the {dependency} artifact at {path} {reason}"
            ),
            Self::TaskFailed {
                phase,
                exit_code,
                stderr_tail,
            } => {
                if stderr_tail.is_empty() {
                    format!(
                        "The {phase} task failed (exit code: {})",
                        display_code(*exit_code)
                    )
                } else {
                    format!(
                        "The {phase} task failed (exit code: {}) with error output: {stderr_tail}",
                        display_code(*exit_code)
                    )
                }
            }
            Self::Timeout { phase, timeout_ms } => format!(
                "The {phase} task timed out after {} and was terminated",
                display_timeout(*timeout_ms)
            ),
            Self::ArtifactNotProduced { phase, expected } => {
                format!("The {phase} task exited successfully but did not write {expected}")
            }
            Self::ArtifactInvalid { phase, path, reason } => {
                format!("The {phase} artifact {path} is unusable: {reason}")
            }
            Self::StoreFailed { phase, path, reason } => {
                format!("Could not manage the {phase} artifact at {path}: {reason}")
            }
            Self::Cancelled { phase } => format!("The {phase} phase was cancelled"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::DependencyNotSatisfied { .. } => Some(
                "Phases run in order Discovery → Analysis → Synthesis → Validation and each consumes the artifacts of its upstream phases.".to_string(),
            ),
            Self::TaskFailed { .. } | Self::Timeout { .. } => Some(
                "The external task is treated as a black box; only its exit status and the artifact it writes are inspected.".to_string(),
            ),
            Self::ArtifactNotProduced { .. } => Some(
                "Tasks must write {SUBJECT}_{DATE}_{phase}.{ext} (or the same name with a .tmp suffix) in the phase directory.".to_string(),
            ),
            Self::ArtifactInvalid { .. } => Some(
                "Artifacts must be non-empty, and structured phases must emit valid JSON.".to_string(),
            ),
            Self::StoreFailed { .. } => None,
            Self::Cancelled { .. } => Some(
                "Artifacts from completed phases were kept; the interrupted phase's partial output was removed.".to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::DependencyNotSatisfied { dependency, .. } => vec![
                format!("Re-run the pipeline so the {dependency} phase regenerates its artifact"),
                "Use `phasegate status <subject>` to inspect which artifacts exist".to_string(),
            ],
            Self::TaskFailed { phase, .. } => vec![
                format!("Run the [tasks.{phase}] command manually to inspect its output"),
                "Re-run with --verbose for the captured stderr tail".to_string(),
            ],
            Self::Timeout { .. } => vec![
                "Increase --phase-timeout or [defaults].phase_timeout".to_string(),
                "Check whether the external task is waiting for input".to_string(),
            ],
            Self::ArtifactNotProduced { .. } => vec![
                "Make the task write the expected file name".to_string(),
                "Enable --glob-fallback to accept differently named outputs (compatibility mode)".to_string(),
            ],
            Self::ArtifactInvalid { .. } => vec![
                "Inspect the task output for truncated or non-JSON content".to_string(),
            ],
            Self::StoreFailed { .. } => vec![
                "Check disk space and permissions on the output root".to_string(),
            ],
            Self::Cancelled { .. } => vec![
                "Re-run with --resume to continue from the last completed phase".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::TaskFailed { .. } | Self::Timeout { .. } => ErrorCategory::ExternalTask,
            Self::ArtifactInvalid { .. } => ErrorCategory::Validation,
            Self::StoreFailed { .. } => ErrorCategory::FileSystem,
            _ => ErrorCategory::PhaseExecution,
        }
    }
}

/// The gated artifact could not be read for confidence extraction
#[derive(Debug, Error)]
pub enum ConfidenceError {
    #[error("Failed to read {path} for confidence extraction: {reason}")]
    Unreadable { path: String, reason: String },
}

impl UserFriendlyError for ConfidenceError {
    fn user_message(&self) -> String {
        match self {
            Self::Unreadable { path, reason } => {
                format!("Could not read the confidence score from {path}: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        Some("A document without any recognised confidence field scores 0.0; only an unreadable file is an error.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        vec!["Check that the artifact still exists and is readable".to_string()]
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::FileSystem
    }
}

impl UserFriendlyError for LockError {
    fn user_message(&self) -> String {
        match self {
            Self::ConcurrentExecution {
                key,
                pid,
                created_ago,
            } => format!(
                "Another phasegate run is already active for '{key}' (PID {pid}, started {created_ago} ago)"
            ),
            Self::CorruptedLock { reason } => format!("Run lock file is corrupted: {reason}"),
            Self::AcquisitionFailed { reason } => format!("Failed to acquire run lock: {reason}"),
            Self::Io(e) => format!("File system error during lock operation: {e}"),
        }
    }

    fn context(&self) -> Option<String> {
        Some("Runs for the same subject and date write the same artifact files, so only one may be active at a time.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ConcurrentExecution { pid, .. } => vec![
                format!("Wait for the other process (PID {pid}) to complete"),
                "Use --force to override if you're certain no other run is active".to_string(),
            ],
            Self::CorruptedLock { .. } => vec![
                "Remove the lock file under <output_root>/.locks/ manually".to_string(),
            ],
            Self::AcquisitionFailed { .. } | Self::Io(_) => vec![
                "Check write permissions on the output root".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::ConcurrentExecution { .. } => ErrorCategory::Concurrency,
            Self::CorruptedLock { .. } => ErrorCategory::Validation,
            Self::AcquisitionFailed { .. } | Self::Io(_) => ErrorCategory::FileSystem,
        }
    }
}

impl UserFriendlyError for PipelineError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Subject(e) => e.user_message(),
            Self::Prerequisite(e) => e.user_message(),
            Self::Phase(e) => e.user_message(),
            Self::Confidence(e) => e.user_message(),
            Self::Lock(e) => e.user_message(),
            Self::Io(e) => format!("File system error: {e}"),
            Self::SummaryWriteFailed { path, reason } => {
                format!("Could not write the run summary to {path}: {reason}")
            }
            Self::Interrupted { stage } => format!("The run was interrupted before {stage}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Subject(e) => e.context(),
            Self::Prerequisite(e) => e.context(),
            Self::Phase(e) => e.context(),
            Self::Confidence(e) => e.context(),
            Self::Lock(e) => e.context(),
            Self::Io(_) | Self::SummaryWriteFailed { .. } => None,
            Self::Interrupted { .. } => Some("No phase was running when the interrupt arrived.".to_string()),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::Subject(e) => e.suggestions(),
            Self::Prerequisite(e) => e.suggestions(),
            Self::Phase(e) => e.suggestions(),
            Self::Confidence(e) => e.suggestions(),
            Self::Lock(e) => e.suggestions(),
            Self::Io(_) | Self::SummaryWriteFailed { .. } => vec![
                "Check disk space and permissions on the output root".to_string(),
            ],
            Self::Interrupted { .. } => vec![],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(e) => e.category(),
            Self::Subject(e) => e.category(),
            Self::Prerequisite(e) => e.category(),
            Self::Phase(e) => e.category(),
            Self::Confidence(e) => e.category(),
            Self::Lock(e) => e.category(),
            Self::Io(_) | Self::SummaryWriteFailed { .. } => ErrorCategory::FileSystem,
            Self::Interrupted { .. } => ErrorCategory::PhaseExecution,
        }
    }
}

// ============================================================================
// PipelineError methods for exit code mapping
// ============================================================================

impl PipelineError {
    /// Get a user-friendly error message with context and actionable suggestions.
    ///
    /// ```text
    /// Error: <user message>
    ///
    /// Context: <context if available>
    ///
    /// Suggestions:
    ///   • <suggestion 1>
    /// ```
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error: {}\n", self.user_message()));

        if let Some(ctx) = self.context() {
            output.push_str(&format!("\nContext: {ctx}\n"));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                output.push_str(&format!("  • {suggestion}\n"));
            }
        }

        output
    }

    /// Map this error to the appropriate CLI exit code.
    ///
    /// This is the single source of truth for CLI exit codes and the
    /// `error_kind` reported in JSON output.
    ///
    /// # Example
    ///
    /// ```rust
    /// use phasegate_utils::error::{PhaseError, PipelineError};
    /// use phasegate_utils::exit_codes::ExitCode;
    /// use phasegate_utils::types::PhaseId;
    ///
    /// let err = PipelineError::Phase(PhaseError::Timeout {
    ///     phase: PhaseId::Synthesis,
    ///     timeout_ms: 900_000,
    /// });
    /// assert_eq!(err.to_exit_code(), ExitCode::SYNTHESIS_PHASE_FAILURE);
    /// ```
    #[must_use]
    pub fn to_exit_code(&self) -> crate::exit_codes::ExitCode {
        use crate::exit_codes::ExitCode;

        match self {
            Self::Config(_) | Self::Subject(_) => ExitCode::INVALID_ARGUMENTS,
            Self::Prerequisite(PrerequisiteError::TaskProgramNotFound { .. }) => {
                ExitCode::MISSING_PREREQUISITES
            }
            Self::Prerequisite(PrerequisiteError::DirectoryCreation { .. }) => {
                ExitCode::DIRECTORY_CREATION_FAILURE
            }
            Self::Phase(PhaseError::Cancelled { .. }) | Self::Interrupted { .. } => {
                ExitCode::INTERRUPTED
            }
            Self::Phase(phase_err) => ExitCode::for_phase(phase_err.phase()),
            Self::Confidence(_) => ExitCode::CONFIDENCE_EXTRACTION_FAILURE,
            Self::Lock(LockError::ConcurrentExecution { .. }) => ExitCode::LOCK_HELD,
            Self::Lock(_) => ExitCode::INTERNAL,
            Self::Io(_) | Self::SummaryWriteFailed { .. } => ExitCode::INTERNAL,
        }
    }
}
