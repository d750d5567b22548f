//! Run command implementation
//!
//! Handles `phasegate run <subject>`.

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use phasegate_config::Config;
use phasegate_engine::{ExternalTaskInvoker, PipelineOptions, PipelineRun, PipelineRunner, RunStatus, RunSummary};
use phasegate_utils::types::RunDate;

use super::common::{resolve_target, store_for};
use super::json_emit::emit_run_json;

/// Per-invocation flags for `run` that are not configuration values.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub subject: String,
    pub date: Option<RunDate>,
    pub resume: bool,
    pub force: bool,
    pub json: bool,
}

/// Execute the run command
pub async fn execute_run_command(request: RunRequest, config: &Config, cancel: &CancellationToken) -> Result<()> {
    let (subject, date) = resolve_target(&request.subject, request.date)?;
    let mut run = PipelineRun::new(
        &subject,
        date,
        config.confidence_threshold(),
        config.max_retry_attempts(),
        config.validation_depth(),
    )?;

    let options = PipelineOptions::from_config(config)
        .with_resume(request.resume)
        .with_force(request.force);
    let invoker = Arc::new(ExternalTaskInvoker::from_config(config));
    let runner = PipelineRunner::new(store_for(config), invoker, options);

    if !request.json {
        println!(
            "Running pipeline for {} ({}) with threshold {:.1}, up to {} retries",
            run.subject, run.run_date, run.confidence_threshold, run.max_retry_attempts
        );
    }

    let outcome = runner.run(&mut run, cancel).await?;

    if request.json {
        println!("{}", emit_run_json(&outcome.summary)?);
        return Ok(());
    }

    print_summary(&outcome.summary);
    println!("\n  Summary: {}", outcome.summary_json);
    println!("  Report:  {}", outcome.summary_md);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    match summary.status {
        RunStatus::Satisfied => println!(
            "\n✓ Completed: confidence {:.2} meets threshold {:.1}",
            summary.final_confidence, summary.confidence_threshold
        ),
        RunStatus::BelowThreshold => {
            println!(
                "\n⚠ WARNING: confidence {:.2} is below threshold {:.1} after {} retry attempt(s)",
                summary.final_confidence, summary.confidence_threshold, summary.attempts_used
            );
            if !summary.confidence_found {
                println!("  No confidence score was found in the Validation report");
            }
            println!("  Review the Validation report before relying on this run");
        }
    }

    println!("\n  Artifacts:");
    for artifact in &summary.artifacts {
        let marker = if artifact.reused { " (reused)" } else { "" };
        println!("    {:<11} {}{marker}", artifact.phase.as_str(), artifact.path);
    }

    if !summary.warnings.is_empty() {
        println!("\n  Warnings:");
        for warning in &summary.warnings {
            println!("    - {warning}");
        }
    }
}

