use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// loglens — SQL log ingestion and anomaly reporting service
#[derive(Parser)]
#[command(name = "loglens", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ingest a log file from disk
    Ingest {
        /// Path to a line-oriented SQL log file
        file: PathBuf,
    },

    /// Build an anomaly report and write it to a file or stdout
    Report {
        #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
        format: ReportFormat,
        /// Start of the window (RFC 3339 or YYYY-MM-DD); default: 7 days ago
        #[arg(long)]
        from: Option<String>,
        /// End of the window (RFC 3339 or YYYY-MM-DD); default: now
        #[arg(long)]
        to: Option<String>,
        /// Restrict to one database
        #[arg(long)]
        db: Option<String>,
        /// Output path; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Json,
    Csv,
    Pdf,
}
