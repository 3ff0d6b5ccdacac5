//! Administrative CLI. The HTTP dashboard and its authentication are
//! explicitly out of scope; this subcommand surface is the sole operator
//! interface the core ships with.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "logcustodyd", version, about = "Compliance-grade log custody pipeline")]
pub struct Cli {
    /// Path to a TOML configuration file. Missing keys fall back to the
    /// documented defaults.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the full pipeline: ingest listener, writer pool, and all
    /// background engines, until a shutdown signal is received.
    Serve,

    /// Run one Signer sweep over sealed files and exit.
    Sign,

    /// Run one Archiver sweep over eligible files and exit.
    Archive,

    /// Re-verify a single file's signature, or a single archive's content
    /// hash, without mutating anything.
    Verify {
        /// Path to a `.log` file (signature re-verification) or a
        /// `.log.gz` archive (archive re-verification).
        path: PathBuf,
    },

    /// Run one Retention Sweeper pass over expired archives and exit.
    Retain,

    /// Generate a compliance report for `[from, to]` and print it as JSON.
    Report {
        #[arg(long)]
        from: chrono::NaiveDate,
        #[arg(long)]
        to: chrono::NaiveDate,
    },
}
