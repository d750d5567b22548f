//! Command-line interface for phasegate
//!
//! - `args`: clap definitions
//! - `run`: entry point, config discovery and dispatch
//! - `commands`: command implementations

pub mod args;
mod commands;
mod run;

pub use args::{Cli, Commands};
pub use run::run;
