//! CLI argument definitions using clap
//!
//! Commands:
//! - bookstore serve --config <path>
//! - bookstore check-config --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// bookstore - a book catalogue service
#[derive(Parser, Debug)]
#[command(name = "bookstore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server and the replication consumer
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./bookstore.json")]
        config: PathBuf,
    },

    /// Load and validate the configuration, then print it as JSON
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./bookstore.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
