//! CLI interface for exit-guard
//!
//! Provides subcommands for:
//! - `run`: Start the risk workers in paper mode
//! - `config`: Show the effective configuration
//! - `curves`: Print risk curve values for sample inputs

mod curves;
mod run;

pub use curves::CurvesArgs;
pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "exit-guard")]
#[command(about = "Adaptive position risk and exit management for intraday index options")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the risk monitor, heartbeat and reconciliation workers
    Run(RunArgs),
    /// Show the effective configuration
    Config,
    /// Print risk curve values
    Curves(CurvesArgs),
}
