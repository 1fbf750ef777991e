//! Core domain types for uploads.
//!
//! Pure data types with no I/O dependencies.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ports::UploadSource;

/// Opaque identifier for one upload task.
///
/// Generated at enqueue time and stable for the task's lifetime, including
/// across a persisted snapshot and a later re-attach.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Access the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UploadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle status of an upload task.
///
/// ```text
/// pending ──► uploading ──► completed
///    ▲            │ ├─────► failed ──┐ (manual retry)
///    │            │ └─────► paused ──┤ (resume)
///    └────────────┴──────────────────┘ (automatic retry)
/// ```
///
/// Cancellation is not a status: a cancelled task is removed from the
/// registry altogether.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Waiting for admission.
    Pending,
    /// Bytes are being transferred.
    Uploading,
    /// Transfer succeeded.
    Completed,
    /// Transfer failed and automatic retries are exhausted.
    Failed,
    /// Transfer was aborted by a queue-wide pause.
    Paused,
}

impl UploadStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Uploading,
        Self::Completed,
        Self::Failed,
        Self::Paused,
    ];

    /// String form used in persisted snapshots.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Uploading)
                | (
                    Self::Uploading,
                    Self::Completed | Self::Failed | Self::Paused | Self::Pending
                )
                | (Self::Paused | Self::Failed, Self::Pending)
        )
    }

    /// `completed` and `failed` are terminal until a manual retry.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pre-authorized destination for one file.
///
/// Supplied by the external "authorize upload" collaborator. The upload URL
/// is opaque and time-limited; the public URL is where the object can be
/// read once the transfer completes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteTarget {
    /// Endpoint accepting a binary PUT of the file body.
    pub upload_url: String,
    /// Read reference for the stored object.
    pub public_url: String,
    /// Storage key of the object.
    pub key: String,
}

impl WriteTarget {
    /// Create a write target.
    pub fn new(
        upload_url: impl Into<String>,
        public_url: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            upload_url: upload_url.into(),
            public_url: public_url.into(),
            key: key.into(),
        }
    }
}

/// A file the caller wants uploaded.
#[derive(Clone, Debug)]
pub struct NewUpload {
    /// Display name of the file.
    pub file_name: String,
    /// Size in bytes, known up front.
    pub file_size: u64,
    /// MIME type sent as `Content-Type`.
    pub file_type: String,
    /// Where the bytes go.
    pub target: WriteTarget,
    /// Re-openable byte stream.
    pub source: Arc<dyn UploadSource>,
}

impl NewUpload {
    /// Describe a new upload.
    pub fn new(
        file_name: impl Into<String>,
        file_size: u64,
        file_type: impl Into<String>,
        target: WriteTarget,
        source: Arc<dyn UploadSource>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            file_size,
            file_type: file_type.into(),
            target,
            source,
        }
    }
}

/// Serializable view of one task, without its live byte stream.
///
/// This is the element type of both `QueueState::tasks` and the persisted
/// snapshot, so field names follow the persisted layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProjection {
    /// Task id.
    pub id: UploadId,
    /// Display name of the file.
    pub file_name: String,
    /// Size in bytes.
    pub file_size: u64,
    /// MIME type.
    pub file_type: String,
    /// Pre-authorized write endpoint.
    pub upload_url: String,
    /// Public read reference.
    pub public_url: String,
    /// Storage key.
    pub key: String,
    /// Current status.
    pub status: UploadStatus,
    /// Integer percentage, 0-100.
    pub progress: u8,
    /// Last error, present only when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failed attempts in the current run.
    #[serde(default)]
    pub retry_count: u32,
}

impl TaskProjection {
    /// Rebuild the write target this projection points at.
    #[must_use]
    pub fn target(&self) -> WriteTarget {
        WriteTarget::new(&self.upload_url, &self.public_url, &self.key)
    }
}
