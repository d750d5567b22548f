//! Canonical JSON (JCS, RFC 8785) emitters for CLI output.

use anyhow::{Context, Result};

use phasegate_engine::RunSummary;
use phasegate_utils::canonicalization::emit_jcs;

use super::common::ErrorJsonOutput;
use super::status::StatusJsonOutput;

pub fn emit_run_json(summary: &RunSummary) -> Result<String> {
    emit_jcs(summary).context("Failed to emit run summary JSON")
}

pub fn emit_status_json(output: &StatusJsonOutput) -> Result<String> {
    emit_jcs(output).context("Failed to emit status JSON")
}

pub fn emit_error_json(output: &ErrorJsonOutput) -> Result<String> {
    emit_jcs(output).context("Failed to emit error JSON")
}
