//! Subcommand definitions.

use std::path::PathBuf;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Upload files, resuming any unfinished uploads of the same files
    Upload {
        /// JSON file mapping each file name to `{uploadUrl, publicUrl, key}`
        #[arg(short = 'm', long = "manifest")]
        manifest: PathBuf,

        /// Files to upload
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },

    /// Show the persisted queue snapshot
    Status {
        /// Print the raw snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Drop the persisted queue snapshot
    Clear,
}
