//! Pipeline engine for phasegate
//!
//! Runs the four phases (Discovery → Analysis → Synthesis → Validation)
//! for one subject and date:
//!
//! - [`artifact::ArtifactStore`] owns the on-disk layout and atomic promotion
//! - [`executor::PhaseExecutor`] runs one phase through a [`invoker::TaskInvoker`]
//! - [`retry::RetryController`] enforces the confidence gate with bounded retries
//! - [`pipeline::PipelineRunner`] ties everything together under a run lock
//! - [`summary::RunSummary`] records the result

pub mod artifact;
pub mod confidence;
pub mod executor;
pub mod invoker;
pub mod pipeline;
pub mod retry;
pub mod run;
pub mod status;
pub mod summary;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use artifact::{Artifact, ArtifactProblem, ArtifactStore, OutputResolution};
pub use confidence::{Confidence, extract_confidence, extract_from_value};
pub use executor::{ExecutedPhase, PhaseExecutor};
pub use invoker::{ExternalTaskInvoker, InvokeError, TaskInvoker, TaskOutput, TaskRequest};
pub use pipeline::{PipelineOptions, PipelineOutcome, PipelineRunner};
pub use retry::{GateOutcome, GateState, RetryController};
pub use run::PipelineRun;
pub use status::{ArtifactState, PhaseStatus, RunReport};
pub use summary::{ArtifactRecord, GateRecord, RunStatus, RunSummary, build_summary};
