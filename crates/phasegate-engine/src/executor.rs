use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, warn};

use phasegate_utils::error::PhaseError;
use phasegate_utils::logging::{log_phase_complete, log_phase_error, log_phase_start, phase_span};
use phasegate_utils::types::PhaseId;

use crate::artifact::{Artifact, ArtifactStore};
use crate::invoker::{InvokeError, TaskInvoker, TaskRequest};
use crate::run::PipelineRun;

/// A phase that completed with a valid artifact.
#[derive(Debug, Clone)]
pub struct ExecutedPhase {
    pub artifact: Artifact,
    /// Degraded-contract notes for the run summary
    pub warnings: Vec<String>,
}

/// What happens to a phase's previous artifact when a new run of it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnFailure {
    /// The upstream artifacts may have changed since it was written.
    Discard,
    /// It was produced by this run and already passed validation.
    KeepPrevious,
}

/// Runs one phase: dependency check, task invocation, output resolution
/// and validation.
///
/// On any failure the phase's staging file and invalid output are removed.
/// [`execute`](Self::execute) then drops the previous artifact, while
/// [`rerun`](Self::rerun) puts it back. Other phases' artifacts are never
/// touched.
pub struct PhaseExecutor {
    store: ArtifactStore,
    invoker: Arc<dyn TaskInvoker>,
    timeout: Duration,
}

impl PhaseExecutor {
    #[must_use]
    pub fn new(store: ArtifactStore, invoker: Arc<dyn TaskInvoker>, timeout: Duration) -> Self {
        Self {
            store,
            invoker,
            timeout,
        }
    }

    #[must_use]
    pub const fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Fail unless every upstream artifact of `phase` is valid.
    pub fn check_dependencies(&self, phase: PhaseId, run: &PipelineRun) -> Result<(), PhaseError> {
        for &dependency in phase.dependencies() {
            let path = self.store.artifact_path(dependency, &run.subject, run.run_date);
            if let Err(problem) = self.store.validate(dependency, &path) {
                return Err(PhaseError::DependencyNotSatisfied {
                    phase,
                    dependency,
                    path: path.to_string(),
                    reason: problem.to_string(),
                });
            }
        }
        Ok(())
    }

    pub async fn execute(
        &self,
        phase: PhaseId,
        run: &PipelineRun,
        cancel: &CancellationToken,
    ) -> Result<ExecutedPhase, PhaseError> {
        let span = phase_span(&run.subject, phase, run.current_attempt);
        self.execute_inner(phase, run, cancel, OnFailure::Discard)
            .instrument(span)
            .await
    }

    /// Re-run a phase whose current artifact belongs to this run; a failed
    /// attempt leaves that artifact in place.
    pub async fn rerun(
        &self,
        phase: PhaseId,
        run: &PipelineRun,
        cancel: &CancellationToken,
    ) -> Result<ExecutedPhase, PhaseError> {
        let span = phase_span(&run.subject, phase, run.current_attempt);
        self.execute_inner(phase, run, cancel, OnFailure::KeepPrevious)
            .instrument(span)
            .await
    }

    async fn execute_inner(
        &self,
        phase: PhaseId,
        run: &PipelineRun,
        cancel: &CancellationToken,
        on_failure: OnFailure,
    ) -> Result<ExecutedPhase, PhaseError> {
        self.check_dependencies(phase, run)?;
        if cancel.is_cancelled() {
            return Err(PhaseError::Cancelled { phase });
        }

        let (subject, date) = (run.subject.as_str(), run.run_date);
        let expected = self.store.artifact_path(phase, subject, date);
        let store_err = |reason: String| PhaseError::StoreFailed {
            phase,
            path: expected.to_string(),
            reason,
        };

        self.store
            .clear_staging(phase, subject, date)
            .map_err(|e| store_err(e.to_string()))?;
        self.store
            .stash(phase, subject, date)
            .map_err(|e| store_err(e.to_string()))?;

        log_phase_start(subject, phase, run.current_attempt);
        let started = Instant::now();

        match self.run_task(phase, run, cancel).await {
            Ok(executed) => {
                if let Err(e) = self.store.discard_stash(phase, subject, date) {
                    warn!(%phase, error = %e, "Failed to remove stashed artifact");
                }
                log_phase_complete(subject, phase, started.elapsed());
                Ok(executed)
            }
            Err(err) => {
                log_phase_error(subject, phase, &err.to_string(), started.elapsed());
                self.roll_back(phase, run, on_failure);
                Err(err)
            }
        }
    }

    async fn run_task(
        &self,
        phase: PhaseId,
        run: &PipelineRun,
        cancel: &CancellationToken,
    ) -> Result<ExecutedPhase, PhaseError> {
        let (subject, date) = (run.subject.as_str(), run.run_date);
        let request = TaskRequest {
            phase,
            subject: subject.to_string(),
            date,
            execution_id: run.execution_id.clone(),
            validation_depth: run.validation_depth,
            output: self.store.artifact_path(phase, subject, date),
            staging: self.store.staging_path(phase, subject, date),
            output_dir: self.store.phase_dir(phase),
            attempt: run.current_attempt,
        };

        let invoked_at = SystemTime::now();
        let output = self
            .invoker
            .invoke(&request, self.timeout, cancel)
            .await
            .map_err(|e| match e {
                InvokeError::Timeout { timeout_ms } => PhaseError::Timeout {
                    phase,
                    timeout_ms,
                },
                InvokeError::Cancelled => PhaseError::Cancelled { phase },
                InvokeError::Spawn { .. } | InvokeError::Other(_) => PhaseError::TaskFailed {
                    phase,
                    exit_code: None,
                    stderr_tail: e.to_string(),
                },
            })?;

        if !output.success() {
            return Err(PhaseError::TaskFailed {
                phase,
                exit_code: output.exit_code,
                stderr_tail: output.stderr_tail,
            });
        }

        let resolution = self
            .store
            .resolve_output(phase, subject, date, invoked_at)
            .map_err(|e| PhaseError::StoreFailed {
                phase,
                path: request.output.to_string(),
                reason: format!("{e:#}"),
            })?
            .ok_or_else(|| PhaseError::ArtifactNotProduced {
                phase,
                expected: request.output.to_string(),
            })?;

        self.store
            .validate(phase, &request.output)
            .map_err(|problem| PhaseError::ArtifactInvalid {
                phase,
                path: request.output.to_string(),
                reason: problem.to_string(),
            })?;

        let artifact =
            self.store
                .inspect(phase, &request.output)
                .map_err(|e| PhaseError::StoreFailed {
                    phase,
                    path: request.output.to_string(),
                    reason: format!("{e:#}"),
                })?;

        let mut warnings = Vec::new();
        if let Some(w) = resolution.warning(phase) {
            warn!(%phase, "{w}");
            warnings.push(w);
        }
        Ok(ExecutedPhase { artifact, warnings })
    }

    fn roll_back(&self, phase: PhaseId, run: &PipelineRun, on_failure: OnFailure) {
        let (subject, date) = (run.subject.as_str(), run.run_date);
        if let Err(e) = self.store.discard_output(phase, subject, date) {
            warn!(%phase, error = %e, "Failed to remove partial output");
        }
        match on_failure {
            OnFailure::KeepPrevious => match self.store.restore_stash(phase, subject, date) {
                Ok(true) => warn!(%phase, "Kept previous artifact after failed re-run"),
                Ok(false) => {}
                Err(e) => warn!(%phase, error = %e, "Failed to restore previous artifact"),
            },
            OnFailure::Discard => {
                if let Err(e) = self.store.discard_stash(phase, subject, date) {
                    warn!(%phase, error = %e, "Failed to remove stale artifact");
                }
            }
        }
    }
}
