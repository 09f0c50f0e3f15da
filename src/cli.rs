//! Command-line argument parsing for por-link.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use por_link::config::Config;

/// Shared Substrate node session tooling for the Proof of Reserve dashboard.
#[derive(Parser, Debug)]
#[command(name = "por-link")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Write logs to the state directory instead of stderr
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Connect to a chain node, print its status, then disconnect
    Status {
        /// Node WebSocket URL (e.g., wss://node.example:9443)
        #[arg(value_name = "ENDPOINT")]
        endpoint: Option<String>,

        /// Use named node from config
        #[arg(short = 'n', long, value_name = "NAME")]
        node: Option<String>,

        /// Seconds to wait for the node readiness signal
        #[arg(long, value_name = "SECS")]
        ready_timeout: Option<u64>,

        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compute the peg ratio between reserves and circulating supply
    Peg {
        /// Total custodial reserves
        #[arg(long, value_name = "AMOUNT")]
        reserves: f64,

        /// Total circulating supply
        #[arg(long, value_name = "AMOUNT")]
        circulation: f64,

        /// Custodian account holding the reserves
        #[arg(long, value_name = "ADDRESS")]
        custodian: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }
}
