use chrono::{Local, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Phase identifiers for the analysis pipeline.
///
/// Phases execute in a fixed linear order and each one consumes the
/// artifacts of the phases listed by [`PhaseId::dependencies`].
///
/// # Phase Order
///
/// ```text
/// Discovery → Analysis → Synthesis → Validation
/// ```
///
/// # Dependencies
///
/// - `Discovery`: none (starting phase)
/// - `Analysis`: requires `Discovery`
/// - `Synthesis`: requires `Discovery` and `Analysis`
/// - `Validation`: requires `Synthesis`
///
/// # Example
///
/// ```rust
/// use phasegate_utils::types::PhaseId;
///
/// let phase = PhaseId::Analysis;
/// assert_eq!(phase.as_str(), "analysis");
/// assert_eq!(phase.dependencies(), &[PhaseId::Discovery]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseId {
    /// Discovery phase: gathers raw material about the subject.
    Discovery,
    /// Analysis phase: structured analysis of the discovered material.
    Analysis,
    /// Synthesis phase: free-text report combining discovery and analysis.
    Synthesis,
    /// Validation phase: scores the synthesized report and emits a confidence value.
    Validation,
}

impl PhaseId {
    /// All phases in execution order.
    pub const ALL: [PhaseId; 4] = [
        PhaseId::Discovery,
        PhaseId::Analysis,
        PhaseId::Synthesis,
        PhaseId::Validation,
    ];

    /// Canonical lowercase name used in paths, logs, and summaries.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Analysis => "analysis",
            Self::Synthesis => "synthesis",
            Self::Validation => "validation",
        }
    }

    /// Upstream phases whose artifacts must be valid before this phase runs.
    #[must_use]
    pub const fn dependencies(&self) -> &'static [PhaseId] {
        match self {
            Self::Discovery => &[],
            Self::Analysis => &[PhaseId::Discovery],
            Self::Synthesis => &[PhaseId::Discovery, PhaseId::Analysis],
            Self::Validation => &[PhaseId::Synthesis],
        }
    }

    #[must_use]
    pub const fn content_kind(&self) -> ContentKind {
        match self {
            Self::Synthesis => ContentKind::FreeText,
            _ => ContentKind::Structured,
        }
    }

    /// File extension of the artifact this phase produces.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self.content_kind() {
            ContentKind::Structured => "json",
            ContentKind::FreeText => "md",
        }
    }

    /// Position of the phase in execution order (0-based).
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::Discovery => 0,
            Self::Analysis => 1,
            Self::Synthesis => 2,
            Self::Validation => 3,
        }
    }

    #[must_use]
    pub const fn next(&self) -> Option<PhaseId> {
        match self {
            Self::Discovery => Some(Self::Analysis),
            Self::Analysis => Some(Self::Synthesis),
            Self::Synthesis => Some(Self::Validation),
            Self::Validation => None,
        }
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discovery" => Ok(Self::Discovery),
            "analysis" => Ok(Self::Analysis),
            "synthesis" => Ok(Self::Synthesis),
            "validation" => Ok(Self::Validation),
            other => Err(format!(
                "unknown phase '{other}' (expected discovery, analysis, synthesis, or validation)"
            )),
        }
    }
}

/// Whether an artifact is structured data (must parse) or free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Structured,
    FreeText,
}

impl ContentKind {
    #[must_use]
    pub const fn is_structured(&self) -> bool {
        matches!(self, Self::Structured)
    }
}

/// Depth of the validation pass, forwarded verbatim to the external tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationDepth {
    #[default]
    Standard,
    Comprehensive,
    Institutional,
}

impl ValidationDepth {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Comprehensive => "comprehensive",
            Self::Institutional => "institutional",
        }
    }
}

impl fmt::Display for ValidationDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "comprehensive" => Ok(Self::Comprehensive),
            "institutional" => Ok(Self::Institutional),
            other => Err(format!(
                "unknown validation depth '{other}' (expected standard, comprehensive, or institutional)"
            )),
        }
    }
}

/// Calendar date of a pipeline run, written as `YYYYMMDD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunDate(NaiveDate);

impl RunDate {
    pub const FORMAT: &'static str = "%Y%m%d";

    /// Parse a strict eight-digit `YYYYMMDD` string.
    pub fn parse(value: &str) -> Result<Self, String> {
        let trimmed = value.trim();
        if trimmed.len() != 8 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("'{value}' is not in YYYYMMDD format"));
        }
        NaiveDate::parse_from_str(trimmed, Self::FORMAT)
            .map(Self)
            .map_err(|e| format!("'{value}' is not a valid calendar date: {e}"))
    }

    /// Today's date in the local timezone.
    #[must_use]
    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }

    #[must_use]
    pub const fn from_naive(date: NaiveDate) -> Self {
        Self(date)
    }

    #[must_use]
    pub const fn as_naive(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for RunDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl FromStr for RunDate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for RunDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RunDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Error kinds for machine-readable failure reporting
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArguments,
    MissingPrerequisites,
    DirectoryCreation,
    TaskExecution,
    AnalysisPhase,
    SynthesisPhase,
    ValidationPhase,
    ConfidenceExtraction,
    LockHeld,
    Interrupted,
    Unknown,
}

/// Source of a configuration value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    /// Value provided via CLI argument (highest precedence).
    Cli,
    /// Value loaded from configuration file.
    Config,
    /// Value provided programmatically (e.g., `Config::builder()`).
    Programmatic,
    /// Built-in default value (lowest precedence).
    Default,
}
