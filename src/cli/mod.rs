//! CLI module for bookstore
//!
//! Provides command-line interface for:
//! - serve: Boot the service and serve until a shutdown signal
//! - check-config: Print the effective configuration

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{check_config, load_config, run, run_command, serve};
pub use errors::{CliError, CliErrorCode, CliResult};
