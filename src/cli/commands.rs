//! CLI command implementations
//!
//! `serve` follows a fixed boot order:
//! 1. Configuration load (file, environment, validation)
//! 2. Logger setup
//! 3. Storage tiers, queue and consumer
//! 4. HTTP server until SIGINT/SIGTERM

use std::io::{self, Write};
use std::path::Path;

use crate::app::{shutdown_signal, App};
use crate::config::AppConfig;
use crate::observability::Logger;

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Main entry point for CLI
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config } => serve(&config),
        Command::CheckConfig { config } => check_config(&config, &mut io::stdout().lock()),
    }
}

/// Load the effective configuration for `config_path`
pub fn load_config(config_path: &Path) -> CliResult<AppConfig> {
    Ok(AppConfig::load(config_path)?)
}

/// Print the effective configuration as JSON
pub fn check_config(config_path: &Path, out: &mut impl Write) -> CliResult<()> {
    let config = load_config(config_path)?;
    serde_json::to_writer_pretty(&mut *out, &config)?;
    writeln!(out)?;
    Ok(())
}

fn build_logger(config: &AppConfig) -> CliResult<Logger> {
    let level = config.logging.severity()?;
    match &config.logging.file {
        Some(path) => Logger::file(Path::new(path), level)
            .map_err(|e| CliError::boot_failed(format!("failed to open log file {}: {}", path, e))),
        None => Ok(Logger::stdout(level)),
    }
}

/// Boot the service and serve until a shutdown signal
pub fn serve(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let logger = build_logger(&config)?;
    logger.info(
        "bookstore starting",
        &[
            ("addr", &config.server.socket_addr()),
            ("backup_dir", &config.storage.backup_dir),
            ("is_production", if config.is_production { "true" } else { "false" }),
        ],
    );

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        let app = App::with_system_clock(config, logger.clone())?;
        app.run(shutdown_signal(logger.clone()))
            .await
            .map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)))?;
        Ok::<(), CliError>(())
    })?;

    logger.info("bookstore stopped", &[]);
    Ok(())
}
