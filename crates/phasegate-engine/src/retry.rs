use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use phasegate_utils::error::{PhaseError, PipelineError};
use phasegate_utils::logging::log_gate_evaluation;
use phasegate_utils::types::PhaseId;

use crate::artifact::Artifact;
use crate::confidence::{Confidence, extract_confidence};
use crate::executor::PhaseExecutor;
use crate::run::PipelineRun;

/// Where the confidence gate ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Checking,
    Satisfied,
    Retrying,
    /// Attempts ran out below threshold; terminal but not an error.
    Exhausted,
}

/// Result of gating one phase.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub phase: PhaseId,
    pub artifact: Artifact,
    pub confidence: Confidence,
    pub attempts_used: u32,
    pub state: GateState,
    pub warnings: Vec<String>,
}

impl GateOutcome {
    #[must_use]
    pub fn below_threshold(&self) -> bool {
        self.state == GateState::Exhausted
    }
}

/// Drives the Checking → Satisfied | Retrying | Exhausted loop.
pub struct RetryController<'a> {
    executor: &'a PhaseExecutor,
    retry_delay: Duration,
}

impl<'a> RetryController<'a> {
    #[must_use]
    pub const fn new(executor: &'a PhaseExecutor, retry_delay: Duration) -> Self {
        Self {
            executor,
            retry_delay,
        }
    }

    /// Score `artifact` once without retrying.
    pub fn evaluate(&self, phase: PhaseId, artifact: Artifact, run: &PipelineRun) -> Result<GateOutcome, PipelineError> {
        let confidence = extract_confidence(&artifact.path)?;
        log_gate_evaluation(&run.subject, confidence.score, confidence.found, run.confidence_threshold, 0);
        let state = if confidence.passes(run.confidence_threshold) {
            GateState::Satisfied
        } else {
            GateState::Exhausted
        };
        Ok(GateOutcome {
            phase,
            artifact,
            confidence,
            attempts_used: 0,
            state,
            warnings: Vec::new(),
        })
    }

    /// Re-run `phase` until its artifact meets the run's threshold or the
    /// retry budget is spent.
    ///
    /// Task and artifact failures during a retry consume the attempt and keep
    /// the previous artifact. Missing dependencies and cancellation are fatal.
    pub async fn ensure_confidence(
        &self,
        phase: PhaseId,
        artifact: Artifact,
        run: &mut PipelineRun,
        cancel: &CancellationToken,
    ) -> Result<GateOutcome, PipelineError> {
        let mut artifact = artifact;
        let mut attempts_used = 0u32;
        let mut warnings = Vec::new();

        loop {
            // Checking
            let confidence = extract_confidence(&artifact.path)?;
            log_gate_evaluation(
                &run.subject,
                confidence.score,
                confidence.found,
                run.confidence_threshold,
                attempts_used,
            );
            let state = if confidence.passes(run.confidence_threshold) {
                GateState::Satisfied
            } else if attempts_used >= run.max_retry_attempts {
                warn!(
                    subject = %run.subject,
                    %phase,
                    confidence = confidence.score,
                    threshold = run.confidence_threshold,
                    attempts_used,
                    "Retry attempts exhausted below confidence threshold"
                );
                GateState::Exhausted
            } else {
                GateState::Retrying
            };

            if state != GateState::Retrying {
                return Ok(GateOutcome {
                    phase,
                    artifact,
                    confidence,
                    attempts_used,
                    state,
                    warnings,
                });
            }

            // Retrying
            self.wait_before_retry(phase, cancel).await?;
            attempts_used += 1;
            run.current_attempt += 1;
            info!(
                subject = %run.subject,
                %phase,
                attempt = attempts_used,
                max_attempts = run.max_retry_attempts,
                "Retrying phase below confidence threshold"
            );

            match self.executor.rerun(phase, run, cancel).await {
                Ok(executed) => {
                    artifact = executed.artifact;
                    warnings.extend(executed.warnings);
                }
                Err(err) if err.is_retryable() => {
                    warn!(%phase, attempt = attempts_used, error = %err, "Retry attempt failed; keeping previous artifact");
                    warnings.push(format!("{phase}: retry attempt {attempts_used} failed: {err}"));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn wait_before_retry(&self, phase: PhaseId, cancel: &CancellationToken) -> Result<(), PhaseError> {
        if self.retry_delay.is_zero() {
            return if cancel.is_cancelled() {
                Err(PhaseError::Cancelled { phase })
            } else {
                Ok(())
            };
        }
        tokio::select! {
            () = tokio::time::sleep(self.retry_delay) => Ok(()),
            () = cancel.cancelled() => Err(PhaseError::Cancelled { phase }),
        }
    }
}
