use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "export-ingest")]
#[command(about = "Ingest personal-data export archives into normalized records", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Detect, parse and normalize every file in an export
    Ingest(IngestArgs),
    /// Classify the files of an export without parsing them
    Detect {
        /// Export root directory
        root: PathBuf,
    },
    /// Inspect or maintain the persistent parse cache
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Export root directory
    pub root: PathBuf,
    /// Write the run manifest as JSON to this file
    #[arg(long)]
    pub manifest: Option<PathBuf>,
    /// Number of parse workers (defaults to configuration, then CPU count)
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Ignore cached results and re-parse every file
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Display the number of entries in the persistent cache
    Count,
    /// Delete every entry in the persistent cache
    Clear,
    /// Delete entries older than the given age
    Sweep {
        #[arg(long, default_value_t = 30)]
        older_than_days: u64,
    },
}
