//! CLI entry point and dispatch
//!
//! `run()` parses arguments, initializes logging, discovers configuration,
//! creates the tokio runtime, dispatches to a command, and prints every
//! error. `main.rs` only turns the returned code into a process exit.

use clap::Parser;
use tokio_util::sync::CancellationToken;

use phasegate_config::Config;
use phasegate_utils::error::PipelineError;
use phasegate_utils::exit_codes::ExitCode;
use phasegate_utils::logging::init_tracing;

use super::args::{Cli, Commands};
use super::commands;

/// Main CLI execution function.
///
/// Returns `Err(code)` after the failure has already been reported.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();
    let json = cli.command.wants_json();

    if let Err(e) = init_tracing(cli.verbose, cli.log_json) {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    let config = match Config::discover(&cli.to_cli_args()) {
        Ok(config) => config,
        Err(err) => {
            let err = PipelineError::from(err);
            commands::report_error(&err, cli.command.name(), json);
            return Err(err.to_exit_code());
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let operation = cli.command.name();
    let result = rt.block_on(async {
        match cli.command {
            Commands::Run {
                subject,
                date,
                resume,
                force,
                json,
                ..
            } => {
                let cancel = CancellationToken::new();
                spawn_interrupt_handler(cancel.clone());
                let request = commands::RunRequest {
                    subject,
                    date,
                    resume,
                    force,
                    json,
                };
                commands::execute_run_command(request, &config, &cancel).await
            }
            Commands::Status { subject, date, json } => {
                commands::execute_status_command(&subject, date, json, &config)
            }
            Commands::Clean { subject, date, force } => {
                commands::execute_clean_command(&subject, date, force, &config)
            }
        }
    });

    if let Err(error) = result {
        if let Some(pipeline_error) = error.downcast_ref::<PipelineError>() {
            commands::report_error(pipeline_error, operation, json);
            return Err(pipeline_error.to_exit_code());
        }
        commands::report_unexpected(&error, json);
        return Err(ExitCode::INTERNAL);
    }

    Ok(())
}

/// Cancel the run on the first Ctrl-C.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping after cleanup");
            cancel.cancel();
        }
    });
}
