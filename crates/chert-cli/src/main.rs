//! chert file inspection CLI.
//!
//! Read-only tooling over store files:
//!
//! ```bash
//! # Per-record listing with Base64 keys
//! chert dump records.db
//!
//! # Hex keys, first ten records only
//! chert dump --hex --limit 10 records.db
//!
//! # File header and geometry
//! chert info records.db
//! ```
//!
//! Exits non-zero on any format error.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Inspect chert record-store files.
#[derive(Parser)]
#[command(name = "chert")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every record's slot, key, and header fields.
    Dump {
        /// Path to the store file.
        path: String,

        /// Render keys as hex instead of Base64.
        #[arg(long)]
        hex: bool,

        /// The file was written without payload CRCs.
        #[arg(long)]
        no_payload_crc: bool,

        /// Only print the first N records.
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print the file header and derived geometry.
    Info {
        /// Path to the store file.
        path: String,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Dump {
            path,
            hex,
            no_payload_crc,
            limit,
        } => commands::dump::run(&path, hex, no_payload_crc, limit),
        Commands::Info { path } => commands::info::run(&path),
    }
}
