//! Exit code constants and error kind mapping for phasegate.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Run completed (including below-threshold completion) |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `INVALID_ARGUMENTS` | Invalid CLI arguments or configuration |
//! | 3 | `MISSING_PREREQUISITES` | A task program is not installed |
//! | 4 | `DIRECTORY_CREATION_FAILURE` | Output directories could not be created |
//! | 5 | `TASK_EXECUTION_FAILURE` | Discovery phase failed |
//! | 6 | `ANALYSIS_PHASE_FAILURE` | Analysis phase failed |
//! | 7 | `SYNTHESIS_PHASE_FAILURE` | Synthesis phase failed |
//! | 8 | `VALIDATION_PHASE_FAILURE` | Validation phase failed |
//! | 9 | `CONFIDENCE_EXTRACTION_FAILURE` | Gated artifact unreadable |
//! | 10 | `LOCK_HELD` | Another run holds the subject/date lock |
//! | 130 | `INTERRUPTED` | Run was cancelled (Ctrl-C) |

use crate::error::{LockError, PhaseError, PipelineError, PrerequisiteError};
use crate::types::{ErrorKind, PhaseId};

/// Process exit code for the `phasegate` binary.
///
/// The numeric values are part of the public interface; scripts rely on them.
///
/// ```rust
/// use phasegate_utils::exit_codes::ExitCode;
/// use phasegate_utils::types::PhaseId;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::for_phase(PhaseId::Validation), ExitCode::VALIDATION_PHASE_FAILURE);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - all phases ran; the gate may still report below-threshold
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// Invalid arguments - bad CLI input, configuration, date, or subject
    pub const INVALID_ARGUMENTS: ExitCode = ExitCode(2);

    /// Missing prerequisites - a configured task program was not found
    pub const MISSING_PREREQUISITES: ExitCode = ExitCode(3);

    /// Output directory tree could not be created
    pub const DIRECTORY_CREATION_FAILURE: ExitCode = ExitCode(4);

    /// Discovery phase failure
    pub const TASK_EXECUTION_FAILURE: ExitCode = ExitCode(5);

    pub const ANALYSIS_PHASE_FAILURE: ExitCode = ExitCode(6);

    pub const SYNTHESIS_PHASE_FAILURE: ExitCode = ExitCode(7);

    pub const VALIDATION_PHASE_FAILURE: ExitCode = ExitCode(8);

    /// The gated artifact could not be read
    pub const CONFIDENCE_EXTRACTION_FAILURE: ExitCode = ExitCode(9);

    /// Lock held - another run is active for the same subject and date
    pub const LOCK_HELD: ExitCode = ExitCode(10);

    /// Interrupted by signal (128 + SIGINT)
    pub const INTERRUPTED: ExitCode = ExitCode(130);

    /// Exit code reported when `phase` fails.
    #[must_use]
    pub const fn for_phase(phase: PhaseId) -> Self {
        match phase {
            PhaseId::Discovery => Self::TASK_EXECUTION_FAILURE,
            PhaseId::Analysis => Self::ANALYSIS_PHASE_FAILURE,
            PhaseId::Synthesis => Self::SYNTHESIS_PHASE_FAILURE,
            PhaseId::Validation => Self::VALIDATION_PHASE_FAILURE,
        }
    }

    /// Get the numeric exit code value.
    ///
    /// Use this with `std::process::exit()`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an ExitCode from a raw i32 value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

/// Convert a `PipelineError` to its (`exit_code`, `error_kind`) pair.
///
/// The exit code comes from [`PipelineError::to_exit_code`]; the kind is
/// the machine-readable label written into JSON failure output.
#[must_use]
pub fn error_to_exit_code_and_kind(error: &PipelineError) -> (ExitCode, ErrorKind) {
    let kind = match error {
        PipelineError::Config(_) | PipelineError::Subject(_) => ErrorKind::InvalidArguments,
        PipelineError::Prerequisite(PrerequisiteError::TaskProgramNotFound { .. }) => {
            ErrorKind::MissingPrerequisites
        }
        PipelineError::Prerequisite(PrerequisiteError::DirectoryCreation { .. }) => {
            ErrorKind::DirectoryCreation
        }
        PipelineError::Phase(PhaseError::Cancelled { .. }) | PipelineError::Interrupted { .. } => {
            ErrorKind::Interrupted
        }
        PipelineError::Phase(phase_err) => match phase_err.phase() {
            PhaseId::Discovery => ErrorKind::TaskExecution,
            PhaseId::Analysis => ErrorKind::AnalysisPhase,
            PhaseId::Synthesis => ErrorKind::SynthesisPhase,
            PhaseId::Validation => ErrorKind::ValidationPhase,
        },
        PipelineError::Confidence(_) => ErrorKind::ConfidenceExtraction,
        PipelineError::Lock(LockError::ConcurrentExecution { .. }) => ErrorKind::LockHeld,
        PipelineError::Lock(_) | PipelineError::Io(_) | PipelineError::SummaryWriteFailed { .. } => {
            ErrorKind::Unknown
        }
    };
    (error.to_exit_code(), kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfidenceError, ConfigError, LockError, SubjectError};

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
        assert_eq!(ExitCode::INTERNAL.as_i32(), 1);
        assert_eq!(ExitCode::INVALID_ARGUMENTS.as_i32(), 2);
        assert_eq!(ExitCode::MISSING_PREREQUISITES.as_i32(), 3);
        assert_eq!(ExitCode::DIRECTORY_CREATION_FAILURE.as_i32(), 4);
        assert_eq!(ExitCode::TASK_EXECUTION_FAILURE.as_i32(), 5);
        assert_eq!(ExitCode::ANALYSIS_PHASE_FAILURE.as_i32(), 6);
        assert_eq!(ExitCode::SYNTHESIS_PHASE_FAILURE.as_i32(), 7);
        assert_eq!(ExitCode::VALIDATION_PHASE_FAILURE.as_i32(), 8);
        assert_eq!(ExitCode::CONFIDENCE_EXTRACTION_FAILURE.as_i32(), 9);
        assert_eq!(ExitCode::LOCK_HELD.as_i32(), 10);
        assert_eq!(ExitCode::INTERRUPTED.as_i32(), 130);
    }

    #[test]
    fn test_for_phase_matches_phase_order() {
        let codes: Vec<i32> = PhaseId::ALL
            .iter()
            .map(|p| ExitCode::for_phase(*p).as_i32())
            .collect();
        assert_eq!(codes, vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_config_and_subject_errors_are_invalid_arguments() {
        let err = PipelineError::Config(ConfigError::InvalidFile("bad".to_string()));
        assert_eq!(
            error_to_exit_code_and_kind(&err),
            (ExitCode::INVALID_ARGUMENTS, ErrorKind::InvalidArguments)
        );

        let err = PipelineError::Subject(SubjectError::Empty);
        assert_eq!(err.to_exit_code(), ExitCode::INVALID_ARGUMENTS);
    }

    #[test]
    fn test_prerequisite_errors() {
        let err = PipelineError::Prerequisite(PrerequisiteError::TaskProgramNotFound {
            phase: PhaseId::Discovery,
            program: "claude".to_string(),
        });
        assert_eq!(
            error_to_exit_code_and_kind(&err),
            (ExitCode::MISSING_PREREQUISITES, ErrorKind::MissingPrerequisites)
        );

        let err = PipelineError::Prerequisite(PrerequisiteError::DirectoryCreation {
            path: "/nope".to_string(),
            reason: "denied".to_string(),
        });
        assert_eq!(err.to_exit_code(), ExitCode::DIRECTORY_CREATION_FAILURE);
    }

    #[test]
    fn test_phase_errors_map_to_phase_codes() {
        let err = PipelineError::Phase(PhaseError::TaskFailed {
            phase: PhaseId::Analysis,
            exit_code: Some(2),
            stderr_tail: String::new(),
        });
        assert_eq!(
            error_to_exit_code_and_kind(&err),
            (ExitCode::ANALYSIS_PHASE_FAILURE, ErrorKind::AnalysisPhase)
        );

        let err = PipelineError::Phase(PhaseError::ArtifactNotProduced {
            phase: PhaseId::Discovery,
            expected: "x.json".to_string(),
        });
        assert_eq!(
            error_to_exit_code_and_kind(&err),
            (ExitCode::TASK_EXECUTION_FAILURE, ErrorKind::TaskExecution)
        );
    }

    #[test]
    fn test_cancellation_maps_to_interrupted() {
        let err = PipelineError::Phase(PhaseError::Cancelled {
            phase: PhaseId::Synthesis,
        });
        assert_eq!(
            error_to_exit_code_and_kind(&err),
            (ExitCode::INTERRUPTED, ErrorKind::Interrupted)
        );
    }

    #[test]
    fn test_confidence_and_lock_errors() {
        let err = PipelineError::Confidence(ConfidenceError::Unreadable {
            path: "v.json".to_string(),
            reason: "permission denied".to_string(),
        });
        assert_eq!(err.to_exit_code(), ExitCode::CONFIDENCE_EXTRACTION_FAILURE);

        let err = PipelineError::Lock(LockError::ConcurrentExecution {
            key: "ACME_20250101".to_string(),
            pid: 42,
            created_ago: "5s".to_string(),
        });
        assert_eq!(
            error_to_exit_code_and_kind(&err),
            (ExitCode::LOCK_HELD, ErrorKind::LockHeld)
        );
    }

    #[test]
    fn test_lock_failures_other_than_contention_are_internal() {
        let corrupted = PipelineError::Lock(LockError::CorruptedLock {
            reason: "expected value at line 1".to_string(),
        });
        assert_eq!(
            error_to_exit_code_and_kind(&corrupted),
            (ExitCode::INTERNAL, ErrorKind::Unknown)
        );

        let io = PipelineError::Lock(LockError::Io(std::io::Error::other("disk full")));
        assert_eq!(io.to_exit_code(), ExitCode::INTERNAL);

        let acquisition = PipelineError::Lock(LockError::AcquisitionFailed {
            reason: "permission denied".to_string(),
        });
        assert_eq!(acquisition.to_exit_code(), ExitCode::INTERNAL);
    }

    #[test]
    fn test_conversions() {
        let code: i32 = ExitCode::LOCK_HELD.into();
        assert_eq!(code, 10);
        assert_eq!(ExitCode::from(130), ExitCode::INTERRUPTED);
        assert_eq!(ExitCode::from_i32(0), ExitCode::SUCCESS);
    }
}
