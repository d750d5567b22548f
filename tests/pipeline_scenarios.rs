//! End-to-end pipeline behavior against the scripted in-process task invoker.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use phasegate_engine::testing::{MockStep, MockTaskInvoker};
use phasegate_engine::{
    ArtifactStore, GateState, InvokeError, PhaseExecutor, PipelineOptions, PipelineRun, PipelineRunner, RunStatus,
    TaskInvoker, TaskOutput, TaskRequest,
};
use phasegate_lock::RunLock;
use phasegate_utils::error::{ConfidenceError, LockError, PhaseError, PipelineError};
use phasegate_utils::exit_codes::ExitCode;
use phasegate_utils::test_support::{phase_artifact, validation_report};
use phasegate_utils::types::{PhaseId, RunDate, ValidationDepth};

const SUBJECT: &str = "TEST";

fn date() -> RunDate {
    RunDate::parse("20250101").unwrap()
}

fn store_in(temp: &TempDir) -> ArtifactStore {
    ArtifactStore::new(Utf8PathBuf::from_path_buf(temp.path().join("out")).unwrap())
}

fn options() -> PipelineOptions {
    PipelineOptions {
        phase_timeout: Duration::from_secs(30),
        retry_delay: Duration::ZERO,
        retry_phases: vec![PhaseId::Validation],
        resume: false,
        force: false,
        lock_ttl_seconds: 3600,
    }
}

fn new_run(threshold: f64, max_retry: u32) -> PipelineRun {
    PipelineRun::new(SUBJECT, date(), threshold, max_retry, ValidationDepth::Standard).unwrap()
}

fn runner(store: &ArtifactStore, invoker: &Arc<MockTaskInvoker>, options: PipelineOptions) -> PipelineRunner {
    PipelineRunner::new(store.clone(), invoker.clone(), options)
}

fn seed_all(store: &ArtifactStore, validation_score: f64) {
    store.ensure_dirs().unwrap();
    for phase in PhaseId::ALL {
        let content = match phase {
            PhaseId::Validation => validation_report(validation_score),
            other => phase_artifact(other, SUBJECT),
        };
        fs::write(store.artifact_path(phase, SUBJECT, date()), content).unwrap();
    }
}

#[tokio::test]
async fn test_end_to_end_success_produces_four_artifacts_and_summary() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let invoker = Arc::new(MockTaskInvoker::new().with_scores([9.5]));
    let mut run = new_run(9.0, 1);

    let outcome = runner(&store, &invoker, options())
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap();

    for phase in PhaseId::ALL {
        assert!(store.validate_phase(phase, SUBJECT, date()).is_ok(), "{phase}");
    }
    let summary = &outcome.summary;
    assert_eq!(summary.final_confidence, 9.5);
    assert!(summary.confidence_found);
    assert_eq!(summary.attempts_used, 0);
    assert!(!summary.below_threshold);
    assert_eq!(summary.status, RunStatus::Satisfied);
    assert_eq!(summary.artifacts.len(), 4);
    assert!(summary.artifacts.iter().all(|a| a.exists && !a.reused));

    assert!(outcome.summary_json.is_file());
    assert!(outcome.summary_md.is_file());
    assert!(RunLock::read_info(store.root(), "TEST_20250101").unwrap().is_none());
}

#[tokio::test]
async fn test_phases_invoked_in_order_with_upstream_valid() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let invoker = Arc::new(MockTaskInvoker::new());
    let mut run = new_run(9.0, 1);

    runner(&store, &invoker, options())
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(invoker.invoked_phases(), PhaseId::ALL.to_vec());
    assert!(invoker.calls().iter().all(|c| c.upstream_valid));
}

#[tokio::test]
async fn test_retries_stop_at_max_attempts_below_threshold() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let invoker = Arc::new(MockTaskInvoker::new().with_scores([5.0]));
    let mut run = new_run(9.0, 3);

    let outcome = runner(&store, &invoker, options())
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap();

    // One initial execution plus three retries.
    assert_eq!(invoker.count(PhaseId::Validation), 4);
    assert_eq!(invoker.count(PhaseId::Discovery), 1);
    let summary = &outcome.summary;
    assert_eq!(summary.attempts_used, 3);
    assert!(summary.below_threshold);
    assert_eq!(summary.status, RunStatus::BelowThreshold);
    assert_eq!(summary.gates[0].state, GateState::Exhausted);
    assert_eq!(summary.final_confidence, 5.0);
}

#[tokio::test]
async fn test_score_equal_to_threshold_passes_without_retry() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let invoker = Arc::new(MockTaskInvoker::new().with_scores([9.0]));
    let mut run = new_run(9.0, 3);

    let outcome = runner(&store, &invoker, options())
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(invoker.count(PhaseId::Validation), 1);
    assert!(!outcome.summary.below_threshold);
}

#[tokio::test]
async fn test_score_just_below_threshold_retries_until_it_passes() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let invoker = Arc::new(MockTaskInvoker::new().with_scores([8.9, 9.2]));
    let mut run = new_run(9.0, 3);

    let outcome = runner(&store, &invoker, options())
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(invoker.count(PhaseId::Validation), 2);
    assert_eq!(outcome.summary.attempts_used, 1);
    assert_eq!(outcome.summary.final_confidence, 9.2);
    assert_eq!(outcome.summary.gates[0].state, GateState::Satisfied);
}

#[tokio::test]
async fn test_failed_retry_consumes_attempt_and_keeps_previous_artifact() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let invoker = Arc::new(MockTaskInvoker::new().with_steps(
        PhaseId::Validation,
        [
            MockStep::Score(7.5),
            MockStep::Fail {
                exit_code: 1,
                partial: Some("{\"overall\":".to_string()),
            },
        ],
    ));
    let mut run = new_run(9.0, 2);

    let outcome = runner(&store, &invoker, options())
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(invoker.count(PhaseId::Validation), 3);
    let summary = &outcome.summary;
    assert_eq!(summary.attempts_used, 2);
    assert!(summary.below_threshold);
    assert_eq!(summary.final_confidence, 7.5);
    assert!(summary.warnings.iter().any(|w| w.contains("retry attempt 1 failed")));

    let kept = fs::read_to_string(store.artifact_path(PhaseId::Validation, SUBJECT, date())).unwrap();
    assert_eq!(kept, validation_report(7.5));
    assert!(!store.staging_path(PhaseId::Validation, SUBJECT, date()).exists());
}

#[tokio::test]
async fn test_ungated_validation_is_scored_once() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let invoker = Arc::new(MockTaskInvoker::new().with_scores([5.0]));
    let options = PipelineOptions {
        retry_phases: Vec::new(),
        ..options()
    };

    let outcome = runner(&store, &invoker, options)
        .run(&mut new_run(9.0, 3), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(invoker.count(PhaseId::Validation), 1);
    let summary = &outcome.summary;
    assert!(summary.gates.is_empty());
    assert_eq!(summary.attempts_used, 0);
    assert_eq!(summary.final_confidence, 5.0);
    assert!(summary.below_threshold);
    assert_eq!(summary.status, RunStatus::BelowThreshold);
}

#[tokio::test]
async fn test_additional_structured_phase_can_be_gated() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let invoker = Arc::new(
        MockTaskInvoker::new()
            .with_steps(PhaseId::Analysis, [MockStep::Score(6.0), MockStep::Score(9.3)])
            .with_scores([9.5]),
    );
    let options = PipelineOptions {
        retry_phases: vec![PhaseId::Analysis, PhaseId::Validation],
        ..options()
    };

    let outcome = runner(&store, &invoker, options)
        .run(&mut new_run(9.0, 2), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        invoker.invoked_phases(),
        vec![
            PhaseId::Discovery,
            PhaseId::Analysis,
            PhaseId::Analysis,
            PhaseId::Synthesis,
            PhaseId::Validation,
        ]
    );
    let summary = &outcome.summary;
    assert_eq!(summary.gates.len(), 2);
    assert_eq!(summary.gates[0].phase, PhaseId::Analysis);
    assert_eq!(summary.gates[0].attempts_used, 1);
    assert_eq!(summary.gates[0].confidence, 9.3);
    assert_eq!(summary.gates[0].state, GateState::Satisfied);
    assert_eq!(summary.gates[1].phase, PhaseId::Validation);
    assert_eq!(summary.gates[1].attempts_used, 0);
    assert_eq!(summary.attempts_used, 1);
    assert_eq!(summary.status, RunStatus::Satisfied);
}

/// Loses the stashed Validation report while a retry of it is running.
struct StashLostDuringRetry {
    store: ArtifactStore,
    inner: MockTaskInvoker,
}

#[async_trait]
impl TaskInvoker for StashLostDuringRetry {
    async fn invoke(
        &self,
        request: &TaskRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<TaskOutput, InvokeError> {
        if request.phase == PhaseId::Validation && request.attempt > 0 {
            fs::remove_file(self.store.stash_path(request.phase, &request.subject, request.date)).unwrap();
        }
        self.inner.invoke(request, timeout, cancel).await
    }
}

#[tokio::test]
async fn test_unreadable_gated_artifact_is_confidence_failure() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let invoker = Arc::new(StashLostDuringRetry {
        store: store.clone(),
        inner: MockTaskInvoker::new().with_steps(
            PhaseId::Validation,
            [
                MockStep::Score(5.0),
                MockStep::Fail {
                    exit_code: 1,
                    partial: None,
                },
            ],
        ),
    });

    let err = PipelineRunner::new(store.clone(), invoker, options())
        .run(&mut new_run(9.0, 1), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Confidence(ConfidenceError::Unreadable { .. })));
    assert_eq!(err.to_exit_code(), ExitCode::CONFIDENCE_EXTRACTION_FAILURE);
    assert!(!store.summary_json_path(SUBJECT, date()).exists());
    assert!(RunLock::read_info(store.root(), "TEST_20250101").unwrap().is_none());
}

#[tokio::test]
async fn test_phase_failure_cleans_only_that_phase() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let invoker = Arc::new(MockTaskInvoker::new().with_steps(
        PhaseId::Synthesis,
        [MockStep::Fail {
            exit_code: 2,
            partial: Some("# half a report".to_string()),
        }],
    ));
    let mut run = new_run(9.0, 1);

    let err = runner(&store, &invoker, options())
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Phase(PhaseError::TaskFailed {
            phase: PhaseId::Synthesis,
            exit_code: Some(2),
            ..
        })
    ));
    assert_eq!(err.to_exit_code(), ExitCode::SYNTHESIS_PHASE_FAILURE);
    assert!(!store.staging_path(PhaseId::Synthesis, SUBJECT, date()).exists());
    assert!(!store.artifact_path(PhaseId::Synthesis, SUBJECT, date()).exists());
    assert!(store.validate_phase(PhaseId::Discovery, SUBJECT, date()).is_ok());
    assert!(store.validate_phase(PhaseId::Analysis, SUBJECT, date()).is_ok());
    assert_eq!(invoker.count(PhaseId::Validation), 0);
    assert!(!store.summary_json_path(SUBJECT, date()).exists());
}

#[tokio::test]
async fn test_missing_upstream_artifact_blocks_invocation() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    store.ensure_dirs().unwrap();
    fs::write(
        store.artifact_path(PhaseId::Discovery, SUBJECT, date()),
        phase_artifact(PhaseId::Discovery, SUBJECT),
    )
    .unwrap();
    let invoker = Arc::new(MockTaskInvoker::new());
    let executor = PhaseExecutor::new(store.clone(), invoker.clone(), Duration::from_secs(5));
    let run = new_run(9.0, 1);

    let err = executor
        .execute(PhaseId::Synthesis, &run, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PhaseError::DependencyNotSatisfied {
            phase: PhaseId::Synthesis,
            dependency: PhaseId::Analysis,
            ..
        }
    ));
    assert_eq!(invoker.count(PhaseId::Synthesis), 0);
}

#[tokio::test]
async fn test_held_lock_rejects_second_run() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    store.ensure_root().unwrap();
    let _held = RunLock::acquire(store.root(), "TEST_20250101", "other-run", false, None).unwrap();
    let invoker = Arc::new(MockTaskInvoker::new());
    let mut run = new_run(9.0, 1);

    let err = runner(&store, &invoker, options())
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Lock(LockError::ConcurrentExecution { .. })));
    assert_eq!(err.to_exit_code(), ExitCode::LOCK_HELD);
    assert!(invoker.calls().is_empty());
}

#[tokio::test]
async fn test_force_overrides_held_lock() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    store.ensure_root().unwrap();
    let held = RunLock::acquire(store.root(), "TEST_20250101", "other-run", false, None).unwrap();
    let invoker = Arc::new(MockTaskInvoker::new());
    let mut run = new_run(9.0, 1);

    let outcome = runner(&store, &invoker, options().with_force(true))
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.summary.status, RunStatus::Satisfied);
    drop(held);
}

#[tokio::test]
async fn test_resume_skips_valid_prefix() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    seed_all(&store, 9.5);
    fs::remove_file(store.artifact_path(PhaseId::Synthesis, SUBJECT, date())).unwrap();
    let invoker = Arc::new(MockTaskInvoker::new());
    let mut run = new_run(9.0, 1);

    let outcome = runner(&store, &invoker, options().with_resume(true))
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap();

    // Everything from the first gap onward re-runs.
    assert_eq!(invoker.invoked_phases(), vec![PhaseId::Synthesis, PhaseId::Validation]);
    let reused: Vec<PhaseId> = outcome
        .summary
        .artifacts
        .iter()
        .filter(|a| a.reused)
        .map(|a| a.phase)
        .collect();
    assert_eq!(reused, vec![PhaseId::Discovery, PhaseId::Analysis]);
}

#[tokio::test]
async fn test_resume_with_complete_run_still_gates_existing_validation() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    seed_all(&store, 8.0);
    let invoker = Arc::new(MockTaskInvoker::new().with_scores([9.4]));
    let mut run = new_run(9.0, 2);

    let outcome = runner(&store, &invoker, options().with_resume(true))
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap();

    // Existing 8.0 report is below threshold, so one retry runs.
    assert_eq!(invoker.invoked_phases(), vec![PhaseId::Validation]);
    assert_eq!(outcome.summary.final_confidence, 9.4);
    assert_eq!(outcome.summary.attempts_used, 1);
}

#[tokio::test]
async fn test_staging_output_is_promoted_with_warning() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let invoker = Arc::new(MockTaskInvoker::new().with_steps(
        PhaseId::Analysis,
        [MockStep::WriteStaging(phase_artifact(PhaseId::Analysis, SUBJECT))],
    ));
    let mut run = new_run(9.0, 1);

    let outcome = runner(&store, &invoker, options())
        .run(&mut run, &CancellationToken::new())
        .await
        .unwrap();

    assert!(store.validate_phase(PhaseId::Analysis, SUBJECT, date()).is_ok());
    assert!(!store.staging_path(PhaseId::Analysis, SUBJECT, date()).exists());
    assert!(outcome.summary.warnings.iter().any(|w| w.contains("staging")));
}

#[tokio::test]
async fn test_glob_fallback_accepts_differently_named_output() {
    let step = || {
        MockStep::WriteNamed {
            file_name: "TEST_final_20250101.json".to_string(),
            content: phase_artifact(PhaseId::Discovery, SUBJECT),
        }
    };

    // Disabled: the phase fails for lack of an artifact.
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let invoker = Arc::new(MockTaskInvoker::new().with_steps(PhaseId::Discovery, [step()]));
    let err = runner(&store, &invoker, options())
        .run(&mut new_run(9.0, 1), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Phase(PhaseError::ArtifactNotProduced {
            phase: PhaseId::Discovery,
            ..
        })
    ));

    // Enabled: the file is promoted to the canonical name.
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp).with_glob_fallback(true);
    let invoker = Arc::new(MockTaskInvoker::new().with_steps(PhaseId::Discovery, [step()]));
    let outcome = runner(&store, &invoker, options())
        .run(&mut new_run(9.0, 1), &CancellationToken::new())
        .await
        .unwrap();
    assert!(store.validate_phase(PhaseId::Discovery, SUBJECT, date()).is_ok());
    assert!(!store.phase_dir(PhaseId::Discovery).join("TEST_final_20250101.json").exists());
    assert!(outcome.summary.warnings.iter().any(|w| w.contains("glob fallback")));
}

#[tokio::test]
async fn test_invalid_structured_artifact_fails_phase() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let invoker = Arc::new(
        MockTaskInvoker::new().with_steps(PhaseId::Analysis, [MockStep::Write("not json".to_string())]),
    );

    let err = runner(&store, &invoker, options())
        .run(&mut new_run(9.0, 1), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Phase(PhaseError::ArtifactInvalid {
            phase: PhaseId::Analysis,
            ..
        })
    ));
    assert!(!store.artifact_path(PhaseId::Analysis, SUBJECT, date()).exists());
}

#[tokio::test]
async fn test_timeout_maps_to_phase_exit_code() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let invoker = Arc::new(MockTaskInvoker::new().with_steps(PhaseId::Discovery, [MockStep::Timeout]));

    let err = runner(&store, &invoker, options())
        .run(&mut new_run(9.0, 1), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Phase(PhaseError::Timeout { .. })));
    assert_eq!(err.to_exit_code(), ExitCode::TASK_EXECUTION_FAILURE);
}

#[tokio::test]
async fn test_cancellation_interrupts_running_phase() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    let invoker = Arc::new(
        MockTaskInvoker::new().with_steps(PhaseId::Analysis, [MockStep::Hang(Duration::from_secs(30))]),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = runner(&store, &invoker, options())
        .run(&mut new_run(9.0, 1), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.to_exit_code(), ExitCode::INTERRUPTED);
    assert_eq!(invoker.count(PhaseId::Synthesis), 0);
    assert!(store.validate_phase(PhaseId::Discovery, SUBJECT, date()).is_ok());
    assert!(RunLock::read_info(store.root(), "TEST_20250101").unwrap().is_none());
}

#[tokio::test]
async fn test_readers_never_see_partial_artifact() {
    let temp = TempDir::new().unwrap();
    let store = store_in(&temp);
    store.ensure_dirs().unwrap();
    let expected = store.artifact_path(PhaseId::Synthesis, SUBJECT, date());
    let staging = store.staging_path(PhaseId::Synthesis, SUBJECT, date());
    let full = format!("# {SUBJECT}\n\n{}", "line of findings\n".repeat(2000));

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let done = Arc::clone(&done);
        let expected = expected.clone();
        let full = full.clone();
        std::thread::spawn(move || {
            let mut observed = 0usize;
            while !done.load(Ordering::SeqCst) {
                if let Ok(content) = fs::read_to_string(&expected) {
                    assert_eq!(content, full, "reader observed a partial artifact");
                    observed += 1;
                }
            }
            observed
        })
    };

    // Slow writer fills the staging file in chunks, then promotes it.
    let mut written = String::new();
    for chunk in full.as_bytes().chunks(4096) {
        written.push_str(std::str::from_utf8(chunk).unwrap());
        fs::write(&staging, &written).unwrap();
        assert!(!expected.exists());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    store
        .resolve_output(PhaseId::Synthesis, SUBJECT, date(), std::time::SystemTime::now())
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    done.store(true, Ordering::SeqCst);

    assert!(reader.join().unwrap() > 0);
    assert_eq!(fs::read_to_string(&expected).unwrap(), full);
    assert!(!staging.exists());
}
