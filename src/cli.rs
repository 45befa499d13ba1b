use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "voicetrim")]
#[command(author, version, about = "Trim recorded audio files without re-encoding")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Trim a file in place to a time range
    Trim {
        /// Recording to trim
        #[arg(required = true)]
        input: PathBuf,

        /// Start of the range in milliseconds
        #[arg(long, default_value = "0")]
        start_ms: u64,

        /// End of the range in milliseconds
        #[arg(long)]
        end_ms: u64,

        /// Show what would be kept without modifying the file
        #[arg(long)]
        dry_run: bool,
    },

    /// Probe a container and display its tracks
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
