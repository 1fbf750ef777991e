//! Upload error types.
//!
//! These errors are serializable and carry no foreign error types, so the
//! message can be stored in a task projection and shown to the user as is.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{UploadId, UploadStatus};

/// Error type for upload operations.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum UploadError {
    /// I/O error while reading the source file.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g., "`NotFound`").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// Network failure or non-2xx response from the write endpoint.
    #[error("Transport error: {message}")]
    Transport {
        /// Detailed error message.
        message: String,
        /// HTTP status code if a response was received.
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// The transfer was aborted on purpose (pause, cancel, teardown).
    #[error("Upload cancelled")]
    Cancelled,

    /// No task with this id is registered.
    #[error("Upload not found: {id}")]
    NotFound {
        /// The id that was looked up.
        id: UploadId,
    },

    /// The requested status change is not allowed by the state machine.
    #[error("Illegal transition for {id}: {from} -> {to}")]
    IllegalTransition {
        /// Task id.
        id: UploadId,
        /// Status the task was in.
        from: UploadStatus,
        /// Status that was requested.
        to: UploadStatus,
    },

    /// The byte stream behind a task cannot be opened.
    #[error("Source unavailable for {id}: {message}")]
    SourceUnavailable {
        /// Task id.
        id: UploadId,
        /// Detailed error message.
        message: String,
    },

    /// General/uncategorized error.
    #[error("{message}")]
    Other {
        /// Error message.
        message: String,
    },
}

impl UploadError {
    /// Create an I/O error from a `std::io::Error`.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        let kind = err.kind();
        Self::Io {
            kind: format!("{kind:?}"),
            message: err.to_string(),
        }
    }

    /// Create a transport error without a status code.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a transport error for an HTTP status.
    pub fn transport_with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self::Transport {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create a not found error.
    #[must_use]
    pub const fn not_found(id: UploadId) -> Self {
        Self::NotFound { id }
    }

    /// Create an illegal transition error.
    #[must_use]
    pub const fn illegal_transition(id: UploadId, from: UploadStatus, to: UploadStatus) -> Self {
        Self::IllegalTransition { id, from, to }
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Whether an automatic retry may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Io { .. } | Self::Other { .. }
        )
    }

    /// Check if this is a deliberate abort.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Convert to a message suitable for the task's `error` field.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Io { message, .. } => format!("Could not read file: {message}"),
            Self::Transport {
                message,
                status_code: Some(code),
            } => format!("Upload failed (HTTP {code}): {message}"),
            Self::Transport { message, .. } => format!("Upload failed: {message}"),
            Self::Cancelled => "Upload was cancelled.".to_string(),
            Self::NotFound { id } => format!("Upload '{id}' is not in the queue."),
            Self::IllegalTransition { from, to, .. } => {
                format!("Cannot move upload from {from} to {to}.")
            }
            Self::SourceUnavailable { message, .. } => {
                format!("The file is no longer available: {message}")
            }
            Self::Other { message } => message.clone(),
        }
    }
}

/// Convenience result type for upload operations.
pub type UploadResult<T> = Result<T, UploadError>;
