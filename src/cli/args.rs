//! CLI argument definitions (clap derive)

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use phasegate_config::CliArgs;
use phasegate_utils::types::{RunDate, ValidationDepth};

/// phasegate - confidence-gated four-phase analysis pipeline
#[derive(Parser, Debug)]
#[command(name = "phasegate")]
#[command(about = "Run Discovery → Analysis → Synthesis → Validation for a subject with a confidence gate")]
#[command(long_about = r#"
phasegate drives four external tasks in strict order for one subject and date.
Each phase must leave a valid artifact before the next one starts, and the
Validation report must reach the confidence threshold or the phase is retried.

EXAMPLES:
  # Run the full pipeline for today
  phasegate run ACME

  # Stricter gate, more retries, fixed date
  phasegate run ACME --date 20250101 --confidence 9.5 --retry 5

  # Continue after a failure, reusing valid artifacts
  phasegate run ACME --date 20250101 --resume

  # Inspect or remove a run
  phasegate status ACME --date 20250101 --json
  phasegate clean ACME --date 20250101

CONFIGURATION:
  Precedence: CLI flags > config file > defaults.
  The config file is found by searching upward from the current directory
  for .phasegate/config.toml, or given with --config.

EXIT CODES:
  0 success (including below-threshold), 2 invalid arguments,
  3 missing task program, 4 output directory failure,
  5-8 Discovery/Analysis/Synthesis/Validation failure,
  9 confidence extraction failure, 10 lock held, 130 interrupted
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Root directory for artifacts and summaries
    #[arg(long, global = true)]
    pub output_root: Option<String>,

    /// Per-phase task timeout in seconds (5-7200)
    #[arg(long, global = true)]
    pub phase_timeout: Option<u64>,

    /// Delay between confidence retries in seconds (0-600)
    #[arg(long, global = true)]
    pub retry_delay: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute the pipeline for a subject
    Run {
        /// Subject identifier (normalized to uppercase)
        subject: String,

        /// Run date as YYYYMMDD (default: today)
        #[arg(long)]
        date: Option<RunDate>,

        /// Confidence threshold (9.0-10.0)
        #[arg(long)]
        confidence: Option<f64>,

        /// Maximum retry attempts for the confidence gate (1-5)
        #[arg(long)]
        retry: Option<u32>,

        /// Validation depth passed to the tasks
        #[arg(long)]
        validation_depth: Option<ValidationDepth>,

        /// Reuse valid artifacts from an earlier run and continue from the first gap
        #[arg(long)]
        resume: bool,

        /// Override a run lock held by another process
        #[arg(long)]
        force: bool,

        /// Accept differently named task output matching the subject and date
        #[arg(long)]
        glob_fallback: bool,

        /// Print the run summary as canonical JSON
        #[arg(long)]
        json: bool,
    },

    /// Show artifact state and the last summary for a subject
    Status {
        subject: String,

        #[arg(long)]
        date: Option<RunDate>,

        /// Output as canonical JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove artifacts and summaries for a subject
    Clean {
        subject: String,

        #[arg(long)]
        date: Option<RunDate>,

        /// Clean even while a run holds the lock
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    /// Whether failures should be reported as JSON on stdout.
    #[must_use]
    pub const fn wants_json(&self) -> bool {
        match self {
            Self::Run { json, .. } | Self::Status { json, .. } => *json,
            Self::Clean { .. } => false,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Run { .. } => "run",
            Self::Status { .. } => "status",
            Self::Clean { .. } => "clean",
        }
    }
}

impl Cli {
    /// Layer the configuration-relevant flags for `Config::discover`.
    #[must_use]
    pub fn to_cli_args(&self) -> CliArgs {
        let mut args = CliArgs {
            config_path: self.config.clone(),
            phase_timeout: self.phase_timeout,
            retry_delay: self.retry_delay,
            output_root: self.output_root.clone(),
            ..CliArgs::default()
        };
        if let Commands::Run {
            confidence,
            retry,
            validation_depth,
            glob_fallback,
            ..
        } = &self.command
        {
            args.confidence_threshold = *confidence;
            args.max_retry_attempts = *retry;
            args.validation_depth = *validation_depth;
            args.glob_fallback = glob_fallback.then_some(true);
        }
        args
    }
}
