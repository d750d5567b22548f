//! Final run summary, persisted as JCS JSON plus a Markdown rendering.

use std::fmt::Write as _;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use phasegate_utils::atomic_write::write_file_atomic;
use phasegate_utils::canonicalization::{CANONICALIZATION_BACKEND, emit_jcs, hash_file};
use phasegate_utils::error::PipelineError;
use phasegate_utils::types::{PhaseId, RunDate, ValidationDepth};

use crate::artifact::ArtifactStore;
use crate::retry::{GateOutcome, GateState};
use crate::run::PipelineRun;

pub const SUMMARY_SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Satisfied,
    BelowThreshold,
}

/// Independent re-check of one expected artifact at summary time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub phase: PhaseId,
    pub path: Utf8PathBuf,
    pub exists: bool,
    pub size_bytes: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub blake3: Option<String>,
    /// Reused from an earlier run instead of re-executed
    #[serde(default)]
    pub reused: bool,
}

impl ArtifactRecord {
    /// Stat and hash `path` directly, without trusting earlier results.
    #[must_use]
    pub fn capture(phase: PhaseId, path: &Utf8Path, reused: bool) -> Self {
        match fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => Self {
                phase,
                path: path.to_path_buf(),
                exists: true,
                size_bytes: Some(metadata.len()),
                last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                blake3: hash_file(path).ok(),
                reused,
            },
            _ => Self {
                phase,
                path: path.to_path_buf(),
                exists: false,
                size_bytes: None,
                last_modified: None,
                blake3: None,
                reused,
            },
        }
    }
}

/// Outcome of one confidence gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateRecord {
    pub phase: PhaseId,
    pub confidence: f64,
    pub confidence_found: bool,
    pub confidence_source: Option<String>,
    pub attempts_used: u32,
    pub state: GateState,
}

impl From<&GateOutcome> for GateRecord {
    fn from(outcome: &GateOutcome) -> Self {
        Self {
            phase: outcome.phase,
            confidence: outcome.confidence.score,
            confidence_found: outcome.confidence.found,
            confidence_source: outcome.confidence.source.clone(),
            attempts_used: outcome.attempts_used,
            state: outcome.state,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: String,
    pub canonicalization: String,
    pub subject: String,
    pub run_date: RunDate,
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub validation_depth: ValidationDepth,
    pub confidence_threshold: f64,
    pub max_retry_attempts: u32,
    pub final_confidence: f64,
    pub confidence_found: bool,
    pub attempts_used: u32,
    pub below_threshold: bool,
    pub status: RunStatus,
    pub gates: Vec<GateRecord>,
    pub artifacts: Vec<ArtifactRecord>,
    pub warnings: Vec<String>,
}

/// Assemble the summary for a finished run.
///
/// `final_gate` is the gate on the Validation artifact; any additional
/// gated phases are listed in `gates`.
#[must_use]
pub fn build_summary(
    run: &PipelineRun,
    store: &ArtifactStore,
    gates: &[GateOutcome],
    final_gate: &GateOutcome,
    reused: &[PhaseId],
    warnings: Vec<String>,
) -> RunSummary {
    let artifacts = PhaseId::ALL
        .iter()
        .map(|&phase| {
            let path = store.artifact_path(phase, &run.subject, run.run_date);
            ArtifactRecord::capture(phase, &path, reused.contains(&phase))
        })
        .collect();

    let below_threshold = gates.iter().any(GateOutcome::below_threshold) || final_gate.below_threshold();

    RunSummary {
        schema_version: SUMMARY_SCHEMA_VERSION.to_string(),
        canonicalization: CANONICALIZATION_BACKEND.to_string(),
        subject: run.subject.clone(),
        run_date: run.run_date,
        execution_id: run.execution_id.clone(),
        started_at: run.started_at,
        completed_at: Utc::now(),
        validation_depth: run.validation_depth,
        confidence_threshold: run.confidence_threshold,
        max_retry_attempts: run.max_retry_attempts,
        final_confidence: final_gate.confidence.score,
        confidence_found: final_gate.confidence.found,
        attempts_used: run.current_attempt,
        below_threshold,
        status: if below_threshold {
            RunStatus::BelowThreshold
        } else {
            RunStatus::Satisfied
        },
        gates: gates.iter().map(GateRecord::from).collect(),
        artifacts,
        warnings,
    }
}

impl RunSummary {
    /// Write `{subject}_{date}_summary.json` and `.md` under the store root.
    pub fn write(&self, store: &ArtifactStore) -> Result<(Utf8PathBuf, Utf8PathBuf), PipelineError> {
        let json_path = store.summary_json_path(&self.subject, self.run_date);
        let md_path = store.summary_md_path(&self.subject, self.run_date);
        let failed = |path: &Utf8Path, e: anyhow::Error| PipelineError::SummaryWriteFailed {
            path: path.to_string(),
            reason: format!("{e:#}"),
        };

        let json = emit_jcs(self).map_err(|e| failed(&json_path, e))?;
        write_file_atomic(&json_path, &json).map_err(|e| failed(&json_path, e))?;
        write_file_atomic(&md_path, &self.render_markdown()).map_err(|e| failed(&md_path, e))?;
        Ok((json_path, md_path))
    }

    /// Load a previously written summary, if present.
    pub fn read(store: &ArtifactStore, subject: &str, date: RunDate) -> anyhow::Result<Option<Self>> {
        let path = store.summary_json_path(subject, date);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    #[must_use]
    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Run summary: {} ({})", self.subject, self.run_date);
        let _ = writeln!(out);
        if self.below_threshold {
            let _ = writeln!(
                out,
                "> **WARNING:** final confidence {:.2} is below the {:.1} threshold after {} retry attempt(s).",
                self.final_confidence, self.confidence_threshold, self.attempts_used
            );
            let _ = writeln!(out);
        }
        let _ = writeln!(out, "- Status: `{}`", status_label(self.status));
        let _ = writeln!(out, "- Execution: `{}`", self.execution_id);
        let _ = writeln!(out, "- Validation depth: {}", self.validation_depth);
        let _ = writeln!(
            out,
            "- Confidence: {:.2} / threshold {:.1}{}",
            self.final_confidence,
            self.confidence_threshold,
            if self.confidence_found { "" } else { " (no score found)" }
        );
        let _ = writeln!(out, "- Retry attempts used: {} of {}", self.attempts_used, self.max_retry_attempts);
        let _ = writeln!(out, "- Started: {}", self.started_at.to_rfc3339());
        let _ = writeln!(out, "- Completed: {}", self.completed_at.to_rfc3339());
        let _ = writeln!(out);

        let _ = writeln!(out, "## Artifacts");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Phase | Path | Size | BLAKE3 |");
        let _ = writeln!(out, "|-------|------|------|--------|");
        for a in &self.artifacts {
            let size = a.size_bytes.map_or_else(|| "missing".to_string(), |s| format!("{s} B"));
            let hash = a.blake3.as_deref().map_or("-", |h| &h[..h.len().min(16)]);
            let _ = writeln!(out, "| {} | `{}` | {} | `{}` |", a.phase, a.path, size, hash);
        }

        if !self.warnings.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Warnings");
            let _ = writeln!(out);
            for w in &self.warnings {
                let _ = writeln!(out, "- {w}");
            }
        }
        out
    }
}

const fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Satisfied => "satisfied",
        RunStatus::BelowThreshold => "below_threshold",
    }
}
