//! Aggregate queue state and the persisted snapshot layout.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::types::{TaskProjection, UploadStatus};

/// Point-in-time view of the whole queue.
///
/// Derived on demand from the registry; never stored on its own.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueState {
    /// Number of tasks in the registry.
    pub total: usize,
    /// Tasks waiting for admission.
    pub pending: usize,
    /// Tasks currently transferring.
    pub uploading: usize,
    /// Tasks that finished successfully.
    pub completed: usize,
    /// Tasks that exhausted their retries.
    pub failed: usize,
    /// Tasks aborted by a queue-wide pause.
    pub paused: usize,
    /// Arithmetic mean of every task's progress (0 for an empty queue).
    pub overall_progress: f64,
    /// Every task, in enqueue order.
    pub tasks: Vec<TaskProjection>,
}

impl QueueState {
    /// Build the aggregate from a list of projections.
    #[must_use]
    pub fn from_tasks(tasks: Vec<TaskProjection>) -> Self {
        let mut state = Self {
            total: tasks.len(),
            ..Self::default()
        };

        let mut progress_sum: u64 = 0;
        for task in &tasks {
            progress_sum += u64::from(task.progress);
            match task.status {
                UploadStatus::Pending => state.pending += 1,
                UploadStatus::Uploading => state.uploading += 1,
                UploadStatus::Completed => state.completed += 1,
                UploadStatus::Failed => state.failed += 1,
                UploadStatus::Paused => state.paused += 1,
            }
        }

        if !tasks.is_empty() {
            #[allow(clippy::cast_precision_loss)]
            let mean = progress_sum as f64 / tasks.len() as f64;
            state.overall_progress = mean;
        }

        state.tasks = tasks;
        state
    }

    /// Number of tasks with the given status.
    #[must_use]
    pub const fn count(&self, status: UploadStatus) -> usize {
        match status {
            UploadStatus::Pending => self.pending,
            UploadStatus::Uploading => self.uploading,
            UploadStatus::Completed => self.completed,
            UploadStatus::Failed => self.failed,
            UploadStatus::Paused => self.paused,
        }
    }

    /// True when nothing is transferring and nothing waits for admission.
    #[must_use]
    pub const fn is_drained(&self) -> bool {
        self.pending == 0 && self.uploading == 0
    }
}

/// Durable projection of the queue, as written to local storage.
///
/// Serialized as `{ "queue": [...], "timestamp": "<RFC 3339>" }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    /// Every task at write time.
    pub queue: Vec<TaskProjection>,
    /// When the snapshot was written.
    pub timestamp: DateTime<Utc>,
}

impl PersistedSnapshot {
    /// Capture a snapshot of `state` stamped with `timestamp`.
    #[must_use]
    pub fn capture(state: &QueueState, timestamp: DateTime<Utc>) -> Self {
        Self {
            queue: state.tasks.clone(),
            timestamp,
        }
    }

    /// Whether the snapshot is older than `max_age` at `now`.
    ///
    /// Snapshots stamped in the future are treated as fresh.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.timestamp) > max_age
    }

    /// Tasks that never reached `completed`, candidates for re-attach.
    pub fn unfinished(&self) -> impl Iterator<Item = &TaskProjection> {
        self.queue
            .iter()
            .filter(|task| task.status != UploadStatus::Completed)
    }
}
