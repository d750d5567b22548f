//! Scriptable in-process [`TaskInvoker`] for tests.
//!
//! Each phase gets a queue of [`MockStep`]s; the last step repeats once the
//! queue is drained. Phases without a script write a plausible artifact
//! (Validation scores 9.5). Every call is recorded together with whether
//! the phase's upstream artifacts were valid at that moment.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8Path;
use tokio_util::sync::CancellationToken;

use phasegate_runner::timeout_millis;
use phasegate_utils::test_support::{phase_artifact, validation_report};
use phasegate_utils::types::PhaseId;

use crate::artifact::ArtifactStore;
use crate::invoker::{InvokeError, TaskInvoker, TaskOutput, TaskRequest};

/// What the mock does for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum MockStep {
    /// Write the content to the final artifact path and exit 0.
    Write(String),
    /// Write the content to the staging path and exit 0.
    WriteStaging(String),
    /// Write the content to `file_name` inside the phase directory and exit 0.
    WriteNamed { file_name: String, content: String },
    /// Write a Validation report with this score and exit 0.
    Score(f64),
    /// Exit 0 without writing anything.
    NoOutput,
    /// Exit with this code; optionally leave a partial staging file behind.
    Fail { exit_code: i32, partial: Option<String> },
    /// Report a timeout.
    Timeout,
    /// Wait for cancellation (or `Duration`) and report it.
    Hang(Duration),
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub request: TaskRequest,
    /// Every dependency artifact was valid when the task was invoked
    pub upstream_valid: bool,
}

#[derive(Debug, Default)]
pub struct MockTaskInvoker {
    scripts: Mutex<HashMap<PhaseId, VecDeque<MockStep>>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockTaskInvoker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the steps for `phase`, replacing any earlier script.
    #[must_use]
    pub fn with_steps(self, phase: PhaseId, steps: impl IntoIterator<Item = MockStep>) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(phase, steps.into_iter().collect());
        }
        self
    }

    /// Shorthand for Validation scores in order.
    #[must_use]
    pub fn with_scores(self, scores: impl IntoIterator<Item = f64>) -> Self {
        self.with_steps(PhaseId::Validation, scores.into_iter().map(MockStep::Score))
    }

    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn invoked_phases(&self) -> Vec<PhaseId> {
        self.calls().iter().map(|c| c.request.phase).collect()
    }

    #[must_use]
    pub fn count(&self, phase: PhaseId) -> usize {
        self.calls().iter().filter(|c| c.request.phase == phase).count()
    }

    fn next_step(&self, request: &TaskRequest) -> MockStep {
        let default = || match request.phase {
            PhaseId::Validation => MockStep::Score(9.5),
            phase => MockStep::Write(phase_artifact(phase, &request.subject)),
        };
        let Ok(mut scripts) = self.scripts.lock() else {
            return default();
        };
        match scripts.get_mut(&request.phase) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(default),
            Some(queue) => queue.front().cloned().unwrap_or_else(default),
            None => default(),
        }
    }

    fn upstream_valid(request: &TaskRequest) -> bool {
        let Some(root) = request.output_dir.parent() else {
            return false;
        };
        let store = ArtifactStore::new(root);
        request.phase.dependencies().iter().all(|&dep| {
            store
                .validate_phase(dep, &request.subject, request.date)
                .is_ok()
        })
    }
}

fn write(path: &Utf8Path, content: &str) -> Result<(), InvokeError> {
    fs::write(path, content).map_err(|e| InvokeError::Other(format!("mock write to {path} failed: {e}")))
}

fn exited(code: i32) -> TaskOutput {
    TaskOutput {
        exit_code: Some(code),
        stdout: String::new(),
        stderr_tail: if code == 0 { String::new() } else { format!("mock task failed with {code}") },
        duration: Duration::from_millis(1),
    }
}

#[async_trait]
impl TaskInvoker for MockTaskInvoker {
    async fn invoke(
        &self,
        request: &TaskRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<TaskOutput, InvokeError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockCall {
                request: request.clone(),
                upstream_valid: Self::upstream_valid(request),
            });
        }

        match self.next_step(request) {
            MockStep::Write(content) => write(&request.output, &content).map(|()| exited(0)),
            MockStep::WriteStaging(content) => write(&request.staging, &content).map(|()| exited(0)),
            MockStep::WriteNamed { file_name, content } => {
                write(&request.output_dir.join(file_name), &content).map(|()| exited(0))
            }
            MockStep::Score(score) => write(&request.output, &validation_report(score)).map(|()| exited(0)),
            MockStep::NoOutput => Ok(exited(0)),
            MockStep::Fail { exit_code, partial } => {
                if let Some(content) = partial {
                    write(&request.staging, &content)?;
                }
                Ok(exited(exit_code))
            }
            MockStep::Timeout => Err(InvokeError::Timeout {
                timeout_ms: timeout_millis(timeout),
            }),
            MockStep::Hang(limit) => {
                tokio::select! {
                    () = cancel.cancelled() => Err(InvokeError::Cancelled),
                    () = tokio::time::sleep(limit) => Err(InvokeError::Timeout { timeout_ms: timeout_millis(limit) }),
                }
            }
        }
    }
}
