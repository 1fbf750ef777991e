//! CLI-specific error types and mappings.
//!
//! Maps upload and store errors to exit codes and user-facing messages.

use lightbox_core::{StoreError, UploadError};
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad input: unknown file, missing manifest entry, malformed manifest.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// IO error (file not found, permission denied, etc.).
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// One or more uploads did not complete.
    #[error("{0}")]
    Upload(String),

    /// Ctrl-C paused the queue before it drained.
    #[error("Interrupted: {paused} upload(s) paused, run the same command again to resume")]
    Interrupted {
        /// Transfers that were aborted and left `paused`.
        paused: usize,
    },
}

impl CliError {
    /// Map error to appropriate exit code.
    ///
    /// Exit codes follow Unix conventions:
    /// - 1: General error
    /// - 2: Misuse of shell command (invalid arguments)
    /// - 64-78: Specific error categories (see sysexits.h)
    /// - 130: Terminated by Ctrl-C
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Upload(_) => 1,
            Self::Arguments(_) => 2,     // EX_USAGE
            Self::Database(_) => 73,     // EX_CANTCREAT (closest fit)
            Self::Io(_) => 74,           // EX_IOERR
            Self::Config(_) => 78,       // EX_CONFIG
            Self::Interrupted { .. } => 130,
        }
    }
}

impl From<UploadError> for CliError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Io { .. } | UploadError::SourceUnavailable { .. } => {
                Self::Io(err.user_message())
            }
            UploadError::NotFound { .. } | UploadError::IllegalTransition { .. } => {
                Self::Arguments(err.user_message())
            }
            _ => Self::Upload(err.user_message()),
        }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
