//! Command handlers.
//!
//! Handlers follow one pattern:
//! - Signature: `pub async fn execute(ctx: &CliContext, ...) -> Result<()>`
//! - Thin wrappers that validate CLI input, drive the `UploadQueue` and
//!   format output for the terminal.

pub mod clear;
pub mod status;
pub mod upload;
