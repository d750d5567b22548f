//! phasegate - confidence-gated four-phase analysis pipeline
//!
//! phasegate runs four external tasks in strict order for one subject and
//! date: Discovery → Analysis → Synthesis → Validation. Each phase must leave
//! a valid artifact before the next one starts, and the Validation report's
//! confidence score must reach a threshold or the phase is retried a bounded
//! number of times.
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! phasegate run ACME --date 20250101 --confidence 9.0 --retry 3
//! phasegate status ACME --date 20250101 --json
//! ```
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use phasegate::{ArtifactStore, Config, ExternalTaskInvoker, PipelineOptions, PipelineRun, PipelineRunner, RunDate};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::builder().confidence_threshold(9.5).build()?;
//! let mut run = PipelineRun::new(
//!     "acme",
//!     RunDate::parse("20250101")?,
//!     config.confidence_threshold(),
//!     config.max_retry_attempts(),
//!     config.validation_depth(),
//! )?;
//! let runner = PipelineRunner::new(
//!     ArtifactStore::new(config.output_root()),
//!     Arc::new(ExternalTaskInvoker::from_config(&config)),
//!     PipelineOptions::from_config(&config),
//! );
//! let outcome = runner.run(&mut run, &CancellationToken::new()).await?;
//! println!("confidence {}", outcome.summary.final_confidence);
//! # Ok(())
//! # }
//! ```
//!
//! # JSON Contracts
//!
//! Run summaries, `status --json` and JSON error reports are emitted in JCS
//! (RFC 8785) canonical form; see [`emit_jcs`].

pub mod cli;

pub use phasegate_config::{CliArgs, Config, ConfigBuilder, ConfigSource};
pub use phasegate_engine::{
    Artifact, ArtifactStore, Confidence, ExternalTaskInvoker, GateOutcome, GateState, PipelineOptions,
    PipelineOutcome, PipelineRun, PipelineRunner, RunReport, RunStatus, RunSummary, TaskInvoker, TaskRequest,
};
pub use phasegate_utils::canonicalization::emit_jcs;
pub use phasegate_utils::error::{PipelineError, UserFriendlyError};
pub use phasegate_utils::exit_codes::ExitCode;
pub use phasegate_utils::types::{PhaseId, RunDate, ValidationDepth};
