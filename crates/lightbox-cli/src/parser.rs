//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Upload photos to pre-authorized storage URLs.
#[derive(Parser)]
#[command(name = "lightbox")]
#[command(about = "Upload media files to pre-authorized storage URLs")]
#[command(version)]
pub struct Cli {
    /// Database holding the persisted queue snapshot
    #[arg(long = "db", env = "LIGHTBOX_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Maximum simultaneous transfers
    #[arg(
        short = 'j',
        long = "concurrency",
        env = "LIGHTBOX_CONCURRENCY",
        global = true,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub concurrency: Option<u16>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}
