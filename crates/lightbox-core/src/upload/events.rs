//! Upload events - discriminated union for all externally visible changes.

use serde::{Deserialize, Serialize};

use super::types::UploadId;

/// Single discriminated union for upload queue events.
///
/// For a given task, `TaskProgress` values never decrease between two
/// `TaskStarted` events, and `TaskCompleted` / `TaskFailed` /
/// `TaskCancelled` is always the last event delivered for that task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// A task entered the registry.
    TaskQueued {
        /// Task id.
        id: UploadId,
        /// Display name of the file.
        file_name: String,
    },

    /// A task was admitted and its transfer began.
    TaskStarted {
        /// Task id.
        id: UploadId,
        /// Zero-based attempt number (equals the retry count).
        attempt: u32,
    },

    /// Transfer progress for one task.
    TaskProgress {
        /// Task id.
        id: UploadId,
        /// Integer percentage, 0-100.
        progress: u8,
    },

    /// A transfer failed and the task went back to `pending` automatically.
    TaskRetrying {
        /// Task id.
        id: UploadId,
        /// Retries consumed so far, including this one.
        retry_count: u32,
        /// Error from the failed attempt.
        error: String,
    },

    /// A task finished successfully.
    TaskCompleted {
        /// Task id.
        id: UploadId,
        /// Where the uploaded object can be read.
        public_url: String,
    },

    /// A task exhausted its retries.
    TaskFailed {
        /// Task id.
        id: UploadId,
        /// Human-readable error.
        error: String,
        /// Retries consumed.
        retry_count: u32,
    },

    /// A task was removed by the caller.
    TaskCancelled {
        /// Task id.
        id: UploadId,
    },

    /// The whole queue was paused.
    QueuePaused {
        /// Transfers aborted and demoted to `paused`.
        aborted: usize,
    },

    /// The queue was resumed.
    QueueResumed {
        /// Paused tasks returned to `pending`.
        requeued: usize,
    },

    /// Nothing is active or pending any more.
    AllComplete {
        /// Completed tasks in the registry at drain time.
        completed: usize,
        /// Failed tasks in the registry at drain time.
        failed: usize,
    },
}

impl UploadEvent {
    /// Create a progress event.
    #[must_use]
    pub const fn progress(id: UploadId, progress: u8) -> Self {
        Self::TaskProgress { id, progress }
    }

    /// Create a failure event.
    pub fn failed(id: UploadId, error: impl Into<String>, retry_count: u32) -> Self {
        Self::TaskFailed {
            id,
            error: error.into(),
            retry_count,
        }
    }

    /// The task this event concerns, if any.
    #[must_use]
    pub const fn task_id(&self) -> Option<UploadId> {
        match self {
            Self::TaskQueued { id, .. }
            | Self::TaskStarted { id, .. }
            | Self::TaskProgress { id, .. }
            | Self::TaskRetrying { id, .. }
            | Self::TaskCompleted { id, .. }
            | Self::TaskFailed { id, .. }
            | Self::TaskCancelled { id } => Some(*id),
            Self::QueuePaused { .. } | Self::QueueResumed { .. } | Self::AllComplete { .. } => {
                None
            }
        }
    }

    /// Whether this is the last event a task will ever produce.
    #[must_use]
    pub const fn is_task_terminal(&self) -> bool {
        matches!(
            self,
            Self::TaskCompleted { .. } | Self::TaskFailed { .. } | Self::TaskCancelled { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let id = UploadId::generate();
        let json = serde_json::to_value(UploadEvent::progress(id, 42)).unwrap();

        assert_eq!(json["type"], "task_progress");
        assert_eq!(json["progress"], 42);
        assert_eq!(json["id"], id.to_string());
    }

    #[test]
    fn test_task_id_and_terminal() {
        let id = UploadId::generate();

        let failed = UploadEvent::failed(id, "HTTP 503", 3);
        assert_eq!(failed.task_id(), Some(id));
        assert!(failed.is_task_terminal());

        let drained = UploadEvent::AllComplete {
            completed: 2,
            failed: 0,
        };
        assert_eq!(drained.task_id(), None);
        assert!(!drained.is_task_terminal());
        assert!(!UploadEvent::progress(id, 10).is_task_terminal());
    }
}
