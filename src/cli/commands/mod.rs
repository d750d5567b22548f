//! CLI command implementations.

mod clean;
mod common;
mod json_emit;
mod run;
mod status;

pub use clean::execute_clean_command;
pub use common::{report_error, report_unexpected};
pub use run::{RunRequest, execute_run_command};
pub use status::execute_status_command;
