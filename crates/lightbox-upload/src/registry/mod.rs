//! Task registry.
//!
//! The single source of truth for every known upload task. This is a pure
//! state machine: no async, no I/O, no tracing. Rejected operations come
//! back as `UploadError`s and the caller decides whether to log them.
//!
//! # Ordering
//!
//! Tasks are kept in enqueue order. Admission scans for the earliest
//! `pending` task, so a task re-queued by an automatic retry keeps its
//! original place in line.

mod task;

use std::sync::Arc;

use indexmap::IndexMap;

use lightbox_core::{
    NewUpload, QueueState, TaskProjection, UploadError, UploadId, UploadSource, UploadStatus,
};

pub use task::UploadTask;

/// Canonical list of upload tasks.
///
/// This is a sync type with no internal locking. The queue facade is
/// responsible for synchronization.
#[derive(Debug, Default)]
pub struct UploadRegistry {
    tasks: IndexMap<UploadId, UploadTask>,
}

impl UploadRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the registry holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Look up a task.
    pub fn get(&self, id: &UploadId) -> Option<&UploadTask> {
        self.tasks.get(id)
    }

    /// Append new uploads as `pending` tasks with generated ids.
    ///
    /// No size limit is enforced, and nothing is admitted here.
    pub fn enqueue(&mut self, uploads: Vec<NewUpload>) -> Vec<UploadTask> {
        uploads
            .into_iter()
            .map(|upload| {
                let task = UploadTask::new(UploadId::generate(), upload);
                self.tasks.insert(task.id, task.clone());
                task
            })
            .collect()
    }

    /// Re-insert an unfinished task from a persisted projection.
    ///
    /// The task comes back `pending` with progress and retry count reset.
    /// Completed projections and ids already present are rejected.
    pub fn reattach(
        &mut self,
        projection: &TaskProjection,
        source: Arc<dyn UploadSource>,
    ) -> Result<UploadTask, UploadError> {
        if projection.status == UploadStatus::Completed {
            return Err(UploadError::illegal_transition(
                projection.id,
                UploadStatus::Completed,
                UploadStatus::Pending,
            ));
        }
        if self.tasks.contains_key(&projection.id) {
            return Err(UploadError::other(format!(
                "Upload '{}' is already queued",
                projection.id
            )));
        }

        let task = UploadTask::from_projection(projection, source);
        self.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    /// Move a task to `to`, validating against the state machine.
    ///
    /// Side effects of the target status:
    /// - `pending`: progress reset to 0 and error cleared; coming from
    ///   `uploading` counts one automatic retry, coming from `failed` is a
    ///   manual retry and resets the retry count
    /// - `completed`: progress forced to 100
    /// - `failed`: `error` recorded (a generic message if none is given);
    ///   coming from `uploading` also counts the failed attempt
    pub fn transition(
        &mut self,
        id: &UploadId,
        to: UploadStatus,
        error: Option<String>,
    ) -> Result<&UploadTask, UploadError> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| UploadError::not_found(*id))?;

        let from = task.status;
        if !from.can_transition_to(to) {
            return Err(UploadError::illegal_transition(*id, from, to));
        }

        task.status = to;
        match to {
            UploadStatus::Pending => {
                task.progress = 0;
                task.error = None;
                match from {
                    UploadStatus::Uploading => task.retry_count += 1,
                    UploadStatus::Failed => task.retry_count = 0,
                    _ => {}
                }
            }
            UploadStatus::Uploading | UploadStatus::Paused => {
                task.error = None;
            }
            UploadStatus::Completed => {
                task.progress = 100;
                task.error = None;
            }
            UploadStatus::Failed => {
                if from == UploadStatus::Uploading {
                    task.retry_count += 1;
                }
                task.error = Some(error.unwrap_or_else(|| "Upload failed".to_string()));
            }
        }

        Ok(task)
    }

    /// Record transfer progress for an `uploading` task.
    ///
    /// Progress never decreases: returns `Ok(Some(p))` when the stored value
    /// rose to `p`, `Ok(None)` when the update was not an increase.
    pub fn record_progress(
        &mut self,
        id: &UploadId,
        progress: u8,
    ) -> Result<Option<u8>, UploadError> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| UploadError::not_found(*id))?;

        if task.status != UploadStatus::Uploading {
            return Err(UploadError::illegal_transition(
                *id,
                task.status,
                UploadStatus::Uploading,
            ));
        }

        let progress = progress.min(100);
        if progress > task.progress {
            task.progress = progress;
            Ok(Some(progress))
        } else {
            Ok(None)
        }
    }

    /// Delete a task unconditionally.
    pub fn remove(&mut self, id: &UploadId) -> Option<UploadTask> {
        self.tasks.shift_remove(id)
    }

    /// Delete every task.
    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    /// The earliest-enqueued `pending` task, if any.
    pub fn next_pending(&self) -> Option<UploadId> {
        self.tasks
            .values()
            .find(|task| task.status == UploadStatus::Pending)
            .map(|task| task.id)
    }

    /// Ids of every task in `status`, in enqueue order.
    pub fn ids_with_status(&self, status: UploadStatus) -> Vec<UploadId> {
        self.tasks
            .values()
            .filter(|task| task.status == status)
            .map(|task| task.id)
            .collect()
    }

    /// Number of tasks in `status`.
    pub fn count(&self, status: UploadStatus) -> usize {
        self.tasks
            .values()
            .filter(|task| task.status == status)
            .count()
    }

    /// Aggregate view for the UI and the persistence adapter.
    pub fn snapshot(&self) -> QueueState {
        QueueState::from_tasks(self.tasks.values().map(UploadTask::projection).collect())
    }
}
