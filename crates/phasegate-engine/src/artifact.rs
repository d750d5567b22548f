//! On-disk layout for phase artifacts.
//!
//! ```text
//! {root}/{phase}/{subject}_{date}_{phase}.{json|md}   final artifact
//! {root}/{phase}/{subject}_{date}_{phase}.{ext}.tmp   staging name written by tasks
//! {root}/{phase}/{subject}_{date}_{phase}.{ext}.bak   previous artifact during a re-run
//! {root}/{subject}_{date}_summary.{json|md}           run summary
//! ```
//!
//! Artifacts become visible under their final name only through a rename,
//! so downstream readers never see a partially written file.

use std::fmt;
use std::fs;
use std::io;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use phasegate_utils::atomic_write::promote_file_atomic;
use phasegate_utils::canonicalization::hash_file;
use phasegate_utils::error::PrerequisiteError;
use phasegate_utils::types::{ContentKind, PhaseId, RunDate};

const STAGING_SUFFIX: &str = "tmp";
const STASH_SUFFIX: &str = "bak";
/// File timestamps come from a coarser clock than `SystemTime::now()`.
const MTIME_SLACK: Duration = Duration::from_secs(2);

/// A validated file produced by one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub phase: PhaseId,
    pub path: Utf8PathBuf,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
    pub content_kind: ContentKind,
    pub blake3: String,
}

/// Why a file does not qualify as a valid artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactProblem {
    Missing,
    Empty,
    Unreadable(String),
    NotJson(String),
}

impl fmt::Display for ArtifactProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("does not exist"),
            Self::Empty => f.write_str("is empty"),
            Self::Unreadable(reason) => write!(f, "could not be read: {reason}"),
            Self::NotJson(reason) => write!(f, "is not valid JSON: {reason}"),
        }
    }
}

/// How a phase's output was located after its task finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputResolution {
    /// The task wrote the expected final name directly.
    Exact,
    /// The task wrote the staging name; it was promoted.
    Staging,
    /// Compatibility mode matched a differently named file; it was promoted.
    Discovered(Utf8PathBuf),
}

impl OutputResolution {
    /// Degraded-contract warning for the run summary, if any.
    #[must_use]
    pub fn warning(&self, phase: PhaseId) -> Option<String> {
        match self {
            Self::Exact => None,
            Self::Staging => Some(format!(
                "{phase}: task wrote the staging name; promoted to the final artifact"
            )),
            Self::Discovered(path) => Some(format!(
                "{phase}: task wrote {path}; accepted via glob fallback"
            )),
        }
    }
}

/// Filesystem store for one output root.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: Utf8PathBuf,
    glob_fallback: bool,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            glob_fallback: false,
        }
    }

    #[must_use]
    pub fn with_glob_fallback(mut self, enabled: bool) -> Self {
        self.glob_fallback = enabled;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    #[must_use]
    pub const fn glob_fallback(&self) -> bool {
        self.glob_fallback
    }

    #[must_use]
    pub fn phase_dir(&self, phase: PhaseId) -> Utf8PathBuf {
        self.root.join(phase.as_str())
    }

    #[must_use]
    pub fn artifact_name(phase: PhaseId, subject: &str, date: RunDate) -> String {
        format!("{subject}_{date}_{phase}.{}", phase.extension())
    }

    #[must_use]
    pub fn artifact_path(&self, phase: PhaseId, subject: &str, date: RunDate) -> Utf8PathBuf {
        self.phase_dir(phase)
            .join(Self::artifact_name(phase, subject, date))
    }

    #[must_use]
    pub fn staging_path(&self, phase: PhaseId, subject: &str, date: RunDate) -> Utf8PathBuf {
        with_suffix(&self.artifact_path(phase, subject, date), STAGING_SUFFIX)
    }

    #[must_use]
    pub fn stash_path(&self, phase: PhaseId, subject: &str, date: RunDate) -> Utf8PathBuf {
        with_suffix(&self.artifact_path(phase, subject, date), STASH_SUFFIX)
    }

    #[must_use]
    pub fn summary_json_path(&self, subject: &str, date: RunDate) -> Utf8PathBuf {
        self.root.join(format!("{subject}_{date}_summary.json"))
    }

    #[must_use]
    pub fn summary_md_path(&self, subject: &str, date: RunDate) -> Utf8PathBuf {
        self.root.join(format!("{subject}_{date}_summary.md"))
    }

    /// Create the output root.
    pub fn ensure_root(&self) -> Result<(), PrerequisiteError> {
        create_dir(&self.root)
    }

    /// Create the output root and one directory per phase.
    pub fn ensure_dirs(&self) -> Result<(), PrerequisiteError> {
        self.ensure_root()?;
        for phase in PhaseId::ALL {
            create_dir(&self.phase_dir(phase))?;
        }
        Ok(())
    }

    /// Check that `path` holds a usable artifact for `phase`.
    pub fn validate(&self, phase: PhaseId, path: &Utf8Path) -> Result<(), ArtifactProblem> {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ArtifactProblem::Missing),
            Err(e) => return Err(ArtifactProblem::Unreadable(e.to_string())),
        };
        if !metadata.is_file() {
            return Err(ArtifactProblem::Missing);
        }
        if metadata.len() == 0 {
            return Err(ArtifactProblem::Empty);
        }
        if phase.content_kind().is_structured() {
            let bytes = fs::read(path).map_err(|e| ArtifactProblem::Unreadable(e.to_string()))?;
            serde_json::from_slice::<serde_json::Value>(&bytes)
                .map_err(|e| ArtifactProblem::NotJson(e.to_string()))?;
        }
        Ok(())
    }

    /// Validate the final artifact for `phase` in place.
    pub fn validate_phase(
        &self,
        phase: PhaseId,
        subject: &str,
        date: RunDate,
    ) -> Result<Utf8PathBuf, ArtifactProblem> {
        let path = self.artifact_path(phase, subject, date);
        self.validate(phase, &path)?;
        Ok(path)
    }

    /// Stat and hash a file as an [`Artifact`].
    pub fn inspect(&self, phase: PhaseId, path: &Utf8Path) -> anyhow::Result<Artifact> {
        let metadata = fs::metadata(path).with_context(|| format!("Failed to stat {path}"))?;
        let modified = metadata
            .modified()
            .with_context(|| format!("No modification time for {path}"))?;
        Ok(Artifact {
            phase,
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
            last_modified: DateTime::<Utc>::from(modified),
            content_kind: phase.content_kind(),
            blake3: hash_file(path)?,
        })
    }

    /// Remove a leftover staging file from an earlier interrupted attempt.
    pub fn clear_staging(&self, phase: PhaseId, subject: &str, date: RunDate) -> io::Result<()> {
        remove_if_exists(&self.staging_path(phase, subject, date))
    }

    /// Move the current artifact (if any) aside before a re-run.
    ///
    /// Returns whether something was stashed.
    pub fn stash(&self, phase: PhaseId, subject: &str, date: RunDate) -> io::Result<bool> {
        let current = self.artifact_path(phase, subject, date);
        if !current.is_file() {
            return Ok(false);
        }
        let stash = self.stash_path(phase, subject, date);
        fs::rename(&current, &stash)?;
        debug!(%phase, stash = %stash, "Stashed previous artifact");
        Ok(true)
    }

    /// Put the stashed artifact back, replacing whatever is at the final name.
    pub fn restore_stash(&self, phase: PhaseId, subject: &str, date: RunDate) -> io::Result<bool> {
        let stash = self.stash_path(phase, subject, date);
        if !stash.is_file() {
            return Ok(false);
        }
        let current = self.artifact_path(phase, subject, date);
        fs::rename(&stash, &current)?;
        debug!(%phase, artifact = %current, "Restored previous artifact");
        Ok(true)
    }

    pub fn discard_stash(&self, phase: PhaseId, subject: &str, date: RunDate) -> io::Result<()> {
        remove_if_exists(&self.stash_path(phase, subject, date))
    }

    /// Find the task's output and make sure it sits at the final name.
    ///
    /// Returns `Ok(None)` when nothing acceptable was written.
    pub fn resolve_output(
        &self,
        phase: PhaseId,
        subject: &str,
        date: RunDate,
        invoked_at: SystemTime,
    ) -> anyhow::Result<Option<OutputResolution>> {
        let expected = self.artifact_path(phase, subject, date);
        if expected.is_file() {
            return Ok(Some(OutputResolution::Exact));
        }

        let staging = self.staging_path(phase, subject, date);
        if staging.is_file() {
            let result = promote_file_atomic(&staging, &expected)?;
            for w in &result.warnings {
                warn!(%phase, warning = %w, "Artifact promotion warning");
            }
            return Ok(Some(OutputResolution::Staging));
        }

        if !self.glob_fallback {
            return Ok(None);
        }

        match self.find_newest_match(phase, subject, date, invoked_at)? {
            Some(found) => {
                warn!(%phase, found = %found, expected = %expected, "Accepting differently named task output");
                promote_file_atomic(&found, &expected)?;
                Ok(Some(OutputResolution::Discovered(found)))
            }
            None => Ok(None),
        }
    }

    fn find_newest_match(
        &self,
        phase: PhaseId,
        subject: &str,
        date: RunDate,
        invoked_at: SystemTime,
    ) -> anyhow::Result<Option<Utf8PathBuf>> {
        let dir = self.phase_dir(phase);
        if !dir.is_dir() {
            return Ok(None);
        }
        let matcher = discovery_matcher(subject, date)?;
        let skip = [
            self.stash_path(phase, subject, date),
            self.staging_path(phase, subject, date),
        ];

        let not_before = invoked_at.checked_sub(MTIME_SLACK).unwrap_or(invoked_at);
        let mut newest: Option<(SystemTime, Utf8PathBuf)> = None;
        for entry in dir.read_dir_utf8().with_context(|| format!("Failed to list {dir}"))? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name();
            if skip.iter().any(|s| s.as_path() == path)
                || !matcher.is_match(name)
                || is_run_artifact_name(name, phase, date)
            {
                continue;
            }
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified()?;
            if modified < not_before {
                continue;
            }
            if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
                newest = Some((modified, path.to_path_buf()));
            }
        }
        Ok(newest.map(|(_, p)| p))
    }

    /// Remove the current phase's staging file and an invalid final artifact.
    pub fn discard_output(&self, phase: PhaseId, subject: &str, date: RunDate) -> io::Result<()> {
        remove_if_exists(&self.staging_path(phase, subject, date))?;
        remove_if_exists(&self.artifact_path(phase, subject, date))
    }

    /// Delete every artifact, staging file, stash and summary for one run key.
    ///
    /// Returns the paths that were removed.
    pub fn remove_run(&self, subject: &str, date: RunDate) -> io::Result<Vec<Utf8PathBuf>> {
        let mut candidates = Vec::new();
        for phase in PhaseId::ALL {
            candidates.push(self.artifact_path(phase, subject, date));
            candidates.push(self.staging_path(phase, subject, date));
            candidates.push(self.stash_path(phase, subject, date));
        }
        candidates.push(self.summary_json_path(subject, date));
        candidates.push(self.summary_md_path(subject, date));

        let mut removed = Vec::new();
        for path in candidates {
            if path.is_file() {
                fs::remove_file(&path)?;
                removed.push(path);
            }
        }
        Ok(removed)
    }
}

fn with_suffix(path: &Utf8Path, suffix: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{path}.{suffix}"))
}

/// Whether `name` is some run's final, staging or stashed artifact for
/// `phase` on `date`. Those belong to their own subject and are never
/// picked up by the glob fallback.
fn is_run_artifact_name(name: &str, phase: PhaseId, date: RunDate) -> bool {
    let name = name
        .strip_suffix(&format!(".{STAGING_SUFFIX}"))
        .or_else(|| name.strip_suffix(&format!(".{STASH_SUFFIX}")))
        .unwrap_or(name);
    name.ends_with(&format!("_{date}_{phase}.{}", phase.extension()))
}

fn create_dir(path: &Utf8Path) -> Result<(), PrerequisiteError> {
    fs::create_dir_all(path).map_err(|e| PrerequisiteError::DirectoryCreation {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

fn remove_if_exists(path: &Utf8Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// `{subject}_*{date}*`: the separator keeps `ACME` from matching `ACMEX_...`.
fn discovery_matcher(subject: &str, date: RunDate) -> anyhow::Result<GlobMatcher> {
    let pattern = format!("{}_*{date}*", globset::escape(subject));
    Ok(Glob::new(&pattern)
        .with_context(|| format!("Invalid discovery pattern {pattern}"))?
        .compile_matcher())
}
