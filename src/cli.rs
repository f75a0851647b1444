use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "autocompress")]
#[command(author, version, about = "Watch a folder and compress new videos with ffmpeg")]
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
    /// Watch the input folder and compress files as they arrive
    Watch {
        /// Folder to watch (overrides the config file)
        #[arg(long)]
        folder: Option<PathBuf>,

        /// Open the watched folder in the file browser
        #[arg(long)]
        open: bool,

        /// Write the final report as JSON to this file on exit
        #[arg(long)]
        json_report: Option<PathBuf>,
    },

    /// Compress a single file right away
    Run {
        /// Input file to compress
        #[arg(required = true)]
        input: PathBuf,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default lookup if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
