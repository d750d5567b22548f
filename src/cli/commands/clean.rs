//! Clean command implementation
//!
//! Handles `phasegate clean`.

use anyhow::{Context, Result};

use phasegate_config::Config;
use phasegate_lock::utils::can_clean;
use phasegate_utils::error::PipelineError;
use phasegate_utils::types::RunDate;

use super::common::{resolve_target, store_for};

/// Execute the clean command
///
/// Refuses while a live run holds the subject/date lock unless `force` is set.
pub fn execute_clean_command(subject: &str, date: Option<RunDate>, force: bool, config: &Config) -> Result<()> {
    let (subject, date) = resolve_target(subject, date)?;
    let store = store_for(config);
    let key = format!("{subject}_{date}");

    can_clean(store.root(), &key, force, Some(config.lock_ttl_seconds())).map_err(PipelineError::from)?;

    let removed = store
        .remove_run(&subject, date)
        .with_context(|| format!("Failed to clean {subject} ({date}) under {}", store.root()))?;

    if removed.is_empty() {
        println!("Nothing to clean for {subject} ({date}) under {}", store.root());
        return Ok(());
    }

    println!("Cleaned {subject} ({date}):");
    for path in &removed {
        println!("  - {path}");
    }
    println!("Removed {} file(s)", removed.len());
    Ok(())
}
