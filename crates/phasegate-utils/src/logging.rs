//! Structured logging for pipeline runs
//!
//! All log output goes to stderr so that `--json` output on stdout stays
//! machine-readable. `RUST_LOG` overrides the default filter.

use std::time::Duration;
use tracing::{Level, error, info, span, warn};
use tracing_subscriber::{EnvFilter, fmt, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt};

use crate::types::PhaseId;

/// Initialize the global tracing subscriber.
///
/// - `verbose`: debug-level output for phasegate crates plus span close timings
/// - `json`: newline-delimited JSON events instead of the compact text format
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(verbose: bool, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("phasegate=debug,phasegate_engine=debug,info")
            } else {
                EnvFilter::try_new("phasegate=info,phasegate_engine=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let span_events = if verbose { FmtSpan::CLOSE } else { FmtSpan::NONE };

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(span_events),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbose)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(span_events)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Span wrapping everything done for one run (subject + date + execution id).
#[must_use]
pub fn run_span(subject: &str, date: &str, execution_id: &str) -> tracing::Span {
    span!(
        Level::INFO,
        "pipeline_run",
        subject = %subject,
        date = %date,
        execution_id = %execution_id,
    )
}

/// Span wrapping a single phase invocation.
#[must_use]
pub fn phase_span(subject: &str, phase: PhaseId, attempt: u32) -> tracing::Span {
    span!(
        Level::INFO,
        "phase_execution",
        subject = %subject,
        phase = %phase,
        attempt = attempt,
    )
}

pub fn log_phase_start(subject: &str, phase: PhaseId, attempt: u32) {
    info!(
        subject = %subject,
        phase = %phase,
        attempt = attempt,
        "Starting phase execution"
    );
}

pub fn log_phase_complete(subject: &str, phase: PhaseId, duration: Duration) {
    info!(
        subject = %subject,
        phase = %phase,
        duration_ms = duration.as_millis() as u64,
        "Phase execution completed"
    );
}

pub fn log_phase_skipped(subject: &str, phase: PhaseId, artifact: &str) {
    info!(
        subject = %subject,
        phase = %phase,
        artifact = %artifact,
        "Phase skipped; valid artifact already present"
    );
}

pub fn log_phase_error(subject: &str, phase: PhaseId, error: &str, duration: Duration) {
    error!(
        subject = %subject,
        phase = %phase,
        error = %error,
        duration_ms = duration.as_millis() as u64,
        "Phase execution failed"
    );
}

/// Log the outcome of one confidence gate evaluation.
pub fn log_gate_evaluation(subject: &str, confidence: f64, found: bool, threshold: f64, attempts_used: u32) {
    if confidence >= threshold {
        info!(
            subject = %subject,
            confidence = confidence,
            found = found,
            threshold = threshold,
            attempts_used = attempts_used,
            "Confidence gate satisfied"
        );
    } else {
        warn!(
            subject = %subject,
            confidence = confidence,
            found = found,
            threshold = threshold,
            attempts_used = attempts_used,
            "Confidence below threshold"
        );
    }
}
