//! Command-line interface definition using clap
//!
//! Provides structured argument parsing with automatic help generation.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

// =============================================================================
// CLI Definition
// =============================================================================

/// Poll an S7 data block and print its decoded values
#[derive(Parser, Debug)]
#[command(name = "s7broker")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: config.toml, then config/default.toml)
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Schema file (overrides config)
    #[arg(long, value_name = "PATH", global = true)]
    pub schema: Option<PathBuf>,

    /// Print snapshots as JSON lines instead of a table
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Validate the schema and print the data block window
    Check,

    /// Replay a recorded frame log through the broker
    Replay {
        /// Frame log (overrides config)
        #[arg(long, value_name = "PATH")]
        log: Option<PathBuf>,

        /// Delay between frames in milliseconds (overrides config)
        #[arg(long, value_name = "MS")]
        interval: Option<u64>,
    },

    /// Poll an in-memory data block image (no PLC required)
    Simulate {
        /// Stop after this many seconds
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,
    },
}

// =============================================================================
// Tests
// =============================================================================
