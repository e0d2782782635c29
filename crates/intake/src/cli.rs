use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "intake", version, about = "Resume ingestion pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a single resume through the full pipeline
    Parse {
        /// Resume file to process
        path: PathBuf,
        /// Structured-field extraction endpoint
        #[arg(long)]
        ai_endpoint: String,
        /// Optional embedding endpoint
        #[arg(long)]
        embed_endpoint: Option<String>,
        /// Bearer token for the extraction/embedding endpoints
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Process many resumes (or zip archives of resumes) as one job
    Bulk {
        /// Files to process
        paths: Vec<PathBuf>,
        /// Structured-field extraction endpoint
        #[arg(long)]
        ai_endpoint: String,
        /// Optional embedding endpoint
        #[arg(long)]
        embed_endpoint: Option<String>,
        /// Bearer token for the extraction/embedding endpoints
        #[arg(long)]
        api_key: Option<String>,
        /// Worker-pool size
        #[arg(long)]
        concurrency: Option<usize>,
        /// SQLite database path (defaults to the user data directory)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Validate, extract, and normalize a file without calling the
    /// extraction service
    Inspect {
        /// File to inspect
        path: PathBuf,
    },
}
