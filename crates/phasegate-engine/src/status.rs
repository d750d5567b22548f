use camino::Utf8PathBuf;
use serde::Serialize;

use phasegate_lock::{LockInfo, RunLock};
use phasegate_utils::types::{PhaseId, RunDate};

use crate::artifact::{ArtifactProblem, ArtifactStore};
use crate::summary::RunSummary;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    Valid,
    Missing,
    Invalid(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseStatus {
    pub phase: PhaseId,
    pub path: Utf8PathBuf,
    pub state: ArtifactState,
    pub size_bytes: Option<u64>,
    /// A staging file from an interrupted run is still present
    pub staging_present: bool,
}

/// Read-only view of one subject/date in the store.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub subject: String,
    pub run_date: RunDate,
    pub phases: Vec<PhaseStatus>,
    pub lock: Option<LockInfo>,
    pub summary: Option<RunSummary>,
}

impl RunReport {
    /// Inspect artifacts, lock and summary without taking the lock.
    pub fn collect(store: &ArtifactStore, subject: &str, date: RunDate) -> anyhow::Result<Self> {
        let phases = PhaseId::ALL
            .iter()
            .map(|&phase| {
                let path = store.artifact_path(phase, subject, date);
                let state = match store.validate(phase, &path) {
                    Ok(()) => ArtifactState::Valid,
                    Err(ArtifactProblem::Missing) => ArtifactState::Missing,
                    Err(problem) => ArtifactState::Invalid(problem.to_string()),
                };
                let size_bytes = std::fs::metadata(&path).ok().map(|m| m.len());
                PhaseStatus {
                    phase,
                    staging_present: store.staging_path(phase, subject, date).is_file(),
                    path,
                    state,
                    size_bytes,
                }
            })
            .collect();

        let lock = RunLock::read_info(store.root(), &format!("{subject}_{date}")).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not read run lock");
            None
        });

        Ok(Self {
            subject: subject.to_string(),
            run_date: date,
            phases,
            lock,
            summary: RunSummary::read(store, subject, date)?,
        })
    }

    /// Last phase with a valid artifact, if any.
    #[must_use]
    pub fn latest_completed(&self) -> Option<PhaseId> {
        self.phases
            .iter()
            .rev()
            .find(|p| p.state == ArtifactState::Valid)
            .map(|p| p.phase)
    }
}
