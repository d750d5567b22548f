use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, warn};

use phasegate_config::Config;
use phasegate_lock::RunLock;
use phasegate_utils::error::{PhaseError, PipelineError};
use phasegate_utils::logging::{log_phase_skipped, run_span};
use phasegate_utils::types::PhaseId;

use crate::artifact::{Artifact, ArtifactStore};
use crate::executor::PhaseExecutor;
use crate::invoker::TaskInvoker;
use crate::retry::{GateOutcome, RetryController};
use crate::run::PipelineRun;
use crate::summary::{RunSummary, build_summary};

/// Knobs that shape one invocation of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub phase_timeout: Duration,
    pub retry_delay: Duration,
    /// Phases whose artifact goes through the confidence gate
    pub retry_phases: Vec<PhaseId>,
    /// Skip phases whose artifact is already valid
    pub resume: bool,
    /// Override a live run lock
    pub force: bool,
    pub lock_ttl_seconds: u64,
}

impl PipelineOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            phase_timeout: config.phase_timeout(),
            retry_delay: config.retry_delay(),
            retry_phases: config.retry_phases(),
            resume: false,
            force: false,
            lock_ttl_seconds: config.lock_ttl_seconds(),
        }
    }

    #[must_use]
    pub const fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    #[must_use]
    pub const fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Completed run: the summary plus where it was written.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub summary: RunSummary,
    pub summary_json: Utf8PathBuf,
    pub summary_md: Utf8PathBuf,
}

/// Runs Discovery → Analysis → Synthesis → Validation for one subject/date.
pub struct PipelineRunner {
    executor: PhaseExecutor,
    invoker: Arc<dyn TaskInvoker>,
    options: PipelineOptions,
}

impl PipelineRunner {
    #[must_use]
    pub fn new(store: ArtifactStore, invoker: Arc<dyn TaskInvoker>, options: PipelineOptions) -> Self {
        let executor = PhaseExecutor::new(store, Arc::clone(&invoker), options.phase_timeout);
        Self {
            executor,
            invoker,
            options,
        }
    }

    #[must_use]
    pub const fn store(&self) -> &ArtifactStore {
        self.executor.store()
    }

    /// Execute every phase in order, gate confidence, and persist the summary.
    ///
    /// A confidence shortfall after all retries is reported in the summary
    /// (`below_threshold`), not as an error.
    pub async fn run(
        &self,
        run: &mut PipelineRun,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let span = run_span(&run.subject, &run.run_date.to_string(), &run.execution_id);
        self.run_inner(run, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        run: &mut PipelineRun,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let store = self.store();

        // The root must exist before the lock directory can be created under it.
        store.ensure_root()?;
        let lock = RunLock::acquire(
            store.root(),
            &run.key(),
            &run.execution_id,
            self.options.force,
            Some(self.options.lock_ttl_seconds),
        )?;
        store.ensure_dirs()?;

        let to_run = self.phases_to_execute(run);
        self.invoker.check_prerequisites(&to_run)?;

        info!(
            subject = %run.subject,
            date = %run.run_date,
            threshold = run.confidence_threshold,
            max_retry_attempts = run.max_retry_attempts,
            "Starting pipeline run"
        );

        let retry = RetryController::new(&self.executor, self.options.retry_delay);
        let mut warnings = Vec::new();
        let mut reused = Vec::new();
        let mut gates: Vec<GateOutcome> = Vec::new();

        for phase in PhaseId::ALL {
            if cancel.is_cancelled() {
                return Err(PipelineError::Interrupted {
                    stage: phase.to_string(),
                });
            }

            let artifact = if to_run.contains(&phase) {
                let executed = self.executor.execute(phase, run, cancel).await?;
                warnings.extend(executed.warnings);
                executed.artifact
            } else {
                let path = store.artifact_path(phase, &run.subject, run.run_date);
                log_phase_skipped(&run.subject, phase, path.as_str());
                reused.push(phase);
                inspect(store, phase, &path)?
            };

            if self.options.retry_phases.contains(&phase) {
                let outcome = retry.ensure_confidence(phase, artifact, run, cancel).await?;
                warnings.extend(outcome.warnings.iter().cloned());
                gates.push(outcome);
            }
        }

        let final_gate = match gates.iter().find(|g| g.phase == PhaseId::Validation) {
            Some(gate) => gate.clone(),
            None => {
                let path = store.artifact_path(PhaseId::Validation, &run.subject, run.run_date);
                retry.evaluate(PhaseId::Validation, inspect(store, PhaseId::Validation, &path)?, run)?
            }
        };

        let summary = build_summary(run, store, &gates, &final_gate, &reused, warnings);
        let (summary_json, summary_md) = summary.write(store)?;

        if summary.below_threshold {
            warn!(
                subject = %run.subject,
                confidence = summary.final_confidence,
                threshold = run.confidence_threshold,
                "Run completed below confidence threshold"
            );
        } else {
            info!(
                subject = %run.subject,
                confidence = summary.final_confidence,
                "Run completed"
            );
        }

        if let Err(e) = lock.release() {
            warn!(error = %e, "Failed to release run lock");
        }

        Ok(PipelineOutcome {
            summary,
            summary_json,
            summary_md,
        })
    }

    /// Phases that will actually be executed (all of them unless resuming).
    ///
    /// When resuming, everything from the first phase without a valid
    /// artifact onward re-runs.
    fn phases_to_execute(&self, run: &PipelineRun) -> Vec<PhaseId> {
        if !self.options.resume {
            return PhaseId::ALL.to_vec();
        }
        let store = self.store();
        let first_missing = PhaseId::ALL
            .iter()
            .position(|&phase| store.validate_phase(phase, &run.subject, run.run_date).is_err());
        match first_missing {
            Some(idx) => PhaseId::ALL[idx..].to_vec(),
            None => Vec::new(),
        }
    }
}

fn inspect(store: &ArtifactStore, phase: PhaseId, path: &Utf8Path) -> Result<Artifact, PhaseError> {
    store.inspect(phase, path).map_err(|e| PhaseError::StoreFailed {
        phase,
        path: path.to_string(),
        reason: format!("{e:#}"),
    })
}
