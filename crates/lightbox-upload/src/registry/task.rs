//! Upload task type (internal implementation).
//!
//! For API responses and persistence, convert to
//! `lightbox_core::TaskProjection`.

use std::sync::Arc;

use lightbox_core::{NewUpload, TaskProjection, UploadId, UploadSource, UploadStatus, WriteTarget};

/// One file's transfer lifecycle.
///
/// Only the registry mutates status, progress, error and retry count.
#[derive(Clone, Debug)]
pub struct UploadTask {
    /// Stable identifier.
    pub id: UploadId,
    /// Display name of the file.
    pub file_name: String,
    /// Size in bytes.
    pub file_size: u64,
    /// MIME type.
    pub file_type: String,
    /// Destination of the bytes.
    pub target: WriteTarget,
    /// Live byte stream; cannot survive a process boundary.
    pub source: Arc<dyn UploadSource>,
    pub(super) status: UploadStatus,
    pub(super) progress: u8,
    pub(super) error: Option<String>,
    pub(super) retry_count: u32,
}

impl UploadTask {
    /// Create a fresh `pending` task for a new upload.
    pub fn new(id: UploadId, upload: NewUpload) -> Self {
        Self {
            id,
            file_name: upload.file_name,
            file_size: upload.file_size,
            file_type: upload.file_type,
            target: upload.target,
            source: upload.source,
            status: UploadStatus::Pending,
            progress: 0,
            error: None,
            retry_count: 0,
        }
    }

    /// Rebuild a `pending` task from a persisted projection and a reopened
    /// source, keeping the original id and write target.
    pub fn from_projection(projection: &TaskProjection, source: Arc<dyn UploadSource>) -> Self {
        Self {
            id: projection.id,
            file_name: projection.file_name.clone(),
            file_size: projection.file_size,
            file_type: projection.file_type.clone(),
            target: projection.target(),
            source,
            status: UploadStatus::Pending,
            progress: 0,
            error: None,
            retry_count: 0,
        }
    }

    /// Current status.
    pub const fn status(&self) -> UploadStatus {
        self.status
    }

    /// Progress percentage.
    pub const fn progress(&self) -> u8 {
        self.progress
    }

    /// Last error, if failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Failed attempts in the current run.
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Serializable view without the byte stream.
    pub fn projection(&self) -> TaskProjection {
        TaskProjection {
            id: self.id,
            file_name: self.file_name.clone(),
            file_size: self.file_size,
            file_type: self.file_type.clone(),
            upload_url: self.target.upload_url.clone(),
            public_url: self.target.public_url.clone(),
            key: self.target.key.clone(),
            status: self.status,
            progress: self.progress,
            error: self.error.clone(),
            retry_count: self.retry_count,
        }
    }
}
