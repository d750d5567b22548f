//! Status command implementation
//!
//! Handles `phasegate status` and `phasegate status --json`.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

use phasegate_config::Config;
use phasegate_engine::{ArtifactState, RunReport};
use phasegate_lock::format_duration_since;
use phasegate_utils::types::RunDate;

use super::common::{resolve_target, store_for};
use super::json_emit::emit_status_json;

#[derive(Debug, Serialize)]
pub struct ConfigValue {
    pub value: String,
    pub source: String,
}

/// `status --json` document.
#[derive(Debug, Serialize)]
pub struct StatusJsonOutput {
    pub schema_version: &'static str,
    pub output_root: String,
    #[serde(flatten)]
    pub report: RunReport,
    pub latest_completed: Option<String>,
    pub effective_config: BTreeMap<String, ConfigValue>,
}

/// Execute the status command
pub fn execute_status_command(subject: &str, date: Option<RunDate>, json: bool, config: &Config) -> Result<()> {
    let (subject, date) = resolve_target(subject, date)?;
    let store = store_for(config);
    let report = RunReport::collect(&store, &subject, date)?;

    if json {
        let effective_config = config
            .effective_config()
            .into_iter()
            .map(|(key, (value, source))| (key, ConfigValue { value, source }))
            .collect();
        let output = StatusJsonOutput {
            schema_version: "1",
            output_root: store.root().to_string(),
            latest_completed: report.latest_completed().map(|p| p.to_string()),
            report,
            effective_config,
        };
        println!("{}", emit_status_json(&output)?);
        return Ok(());
    }

    println!("Status for {} ({})", report.subject, report.run_date);
    println!("  Output root: {}", store.root());

    for phase in &report.phases {
        let state = match &phase.state {
            ArtifactState::Valid => match phase.size_bytes {
                Some(size) => format!("✓ valid ({size} bytes)"),
                None => "✓ valid".to_string(),
            },
            ArtifactState::Missing => "· missing".to_string(),
            ArtifactState::Invalid(reason) => format!("✗ invalid: {reason}"),
        };
        println!("  {:<11} {state}", phase.phase.as_str());
        if phase.staging_present {
            println!("              staging file left by an interrupted run");
        }
    }

    if let Some(lock) = &report.lock {
        println!(
            "\n  Locked by pid {} ({} ago, execution {})",
            lock.pid,
            format_duration_since(lock.created_at),
            lock.execution_id
        );
    }

    match &report.summary {
        Some(summary) => {
            println!(
                "\n  Last run: {} at {}",
                summary.execution_id,
                summary.completed_at.to_rfc3339()
            );
            println!(
                "  Confidence: {:.2} / {:.1}{}",
                summary.final_confidence,
                summary.confidence_threshold,
                if summary.below_threshold { "  ⚠ below threshold" } else { "" }
            );
            println!("  Retry attempts used: {}", summary.attempts_used);
        }
        None => println!("\n  No run summary yet"),
    }

    Ok(())
}
