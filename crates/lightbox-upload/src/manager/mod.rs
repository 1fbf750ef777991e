//! Upload queue facade.
//!
//! Owns the registry and scheduler behind one lock, spawns a transfer per
//! admitted task, and applies each transfer's outcome when it finishes.
//!
//! # Architecture
//!
//! - **Registry / scheduler**: pure state, mutated only under `core`'s write lock
//! - **Transfers**: one spawned task per admission, running the executor with
//!   a child cancellation token; progress flows out through a `watch` channel
//! - **Progress bridge**: applies watch updates to the registry and emits events
//! - **Notifier / persistence writer**: background tasks fed over channels, so
//!   nothing awaits I/O while holding the lock
//!
//! # Concurrency Model
//!
//! - Every state change happens under the single `core` lock, so admission,
//!   finalize and snapshot reads never interleave
//! - Lease tokens prevent stale finalize commits after pause, cancel or clear
//! - One root `CancellationToken` per queue; dropping the queue cancels it and
//!   with it every in-flight transfer

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use lightbox_core::{
    KeyValueStorePort, NewUpload, PersistedSnapshot, QueueState, TaskProjection, UploadError,
    UploadEvent, UploadEventEmitterPort, UploadId, UploadSource, UploadStatus,
    UploadTransportPort,
};

use crate::LOG_TARGET;
use crate::config::UploadQueueConfig;
use crate::executor::{Settlement, TransferJob, TransferOutcome, backoff, run_job, settle};
use crate::notifier::EventNotifier;
use crate::persistence::{PersistHandle, QueuePersistence};
use crate::registry::{UploadRegistry, UploadTask};
use crate::scheduler::AdmissionScheduler;

/// Lease ID for tracking active transfers.
///
/// Used to prevent stale finalize commits when a transfer is aborted or
/// its task removed while it was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LeaseId(u64);

/// State for an active transfer.
struct ActiveTransfer {
    /// Unique lease for this attempt.
    lease: LeaseId,
    /// Child of the queue's root token.
    cancel: CancellationToken,
}

/// Everything guarded by the queue lock.
struct QueueCore {
    registry: UploadRegistry,
    scheduler: AdmissionScheduler,
    active: HashMap<UploadId, ActiveTransfer>,
    /// Set when work arrives, cleared when the queue drains.
    busy: bool,
}

impl QueueCore {
    /// Verify the lease matches and remove it from the active map.
    fn verify_and_remove_lease(&mut self, id: &UploadId, lease: LeaseId) -> bool {
        self.active
            .get(id)
            .is_some_and(|transfer| transfer.lease == lease)
            .then(|| self.active.remove(id))
            .is_some()
    }

    fn holds_lease(&self, id: &UploadId, lease: LeaseId) -> bool {
        self.active
            .get(id)
            .is_some_and(|transfer| transfer.lease == lease)
    }

    /// Abort every active transfer and forget its lease.
    fn abort_all(&mut self) -> Vec<UploadId> {
        self.active
            .drain()
            .map(|(id, transfer)| {
                transfer.cancel.cancel();
                id
            })
            .collect()
    }
}

/// Dependencies for building an upload queue.
pub struct UploadQueueDeps<T, S, E> {
    /// Sends bytes to write targets.
    pub transport: Arc<T>,
    /// Durable store for the persisted snapshot.
    pub store: Arc<S>,
    /// Receives every queue event.
    pub emitter: Arc<E>,
    /// Tuning.
    pub config: UploadQueueConfig,
}

/// Build an upload queue from its dependencies.
///
/// Must be called from within a Tokio runtime: the queue spawns its event
/// dispatcher and persistence writer immediately.
pub fn build_upload_queue<T, S, E>(deps: UploadQueueDeps<T, S, E>) -> UploadQueue
where
    T: UploadTransportPort + 'static,
    S: KeyValueStorePort + 'static,
    E: UploadEventEmitterPort + 'static,
{
    UploadQueue::new(deps.transport, deps.store, deps.emitter, deps.config)
}

/// State shared between the facade and its spawned transfers.
struct Shared {
    core: RwLock<QueueCore>,
    transport: Arc<dyn UploadTransportPort>,
    persistence: Arc<QueuePersistence>,
    writer: PersistHandle,
    notifier: EventNotifier,
    config: UploadQueueConfig,
    lease_counter: AtomicU64,
    shutdown: CancellationToken,
}

/// Parallel upload queue.
///
/// At most `max_concurrent` transfers run at once; pending tasks are admitted
/// in enqueue order. Every mutation is persisted and every externally
/// visible change is emitted as an `UploadEvent`.
///
/// Dropping the queue aborts all in-flight transfers.
pub struct UploadQueue {
    shared: Arc<Shared>,
}

impl UploadQueue {
    /// Create a queue.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        transport: Arc<dyn UploadTransportPort>,
        store: Arc<dyn KeyValueStorePort>,
        emitter: Arc<dyn UploadEventEmitterPort>,
        config: UploadQueueConfig,
    ) -> Self {
        let persistence = Arc::new(QueuePersistence::new(
            store,
            config.storage_key.clone(),
            config.snapshot_max_age,
        ));
        let writer = Arc::clone(&persistence).spawn_writer();

        let shared = Shared {
            core: RwLock::new(QueueCore {
                registry: UploadRegistry::new(),
                scheduler: AdmissionScheduler::new(config.max_concurrent),
                active: HashMap::new(),
                busy: false,
            }),
            transport,
            persistence,
            writer,
            notifier: EventNotifier::spawn(emitter),
            config,
            lease_counter: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        };

        Self {
            shared: Arc::new(shared),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &UploadQueueConfig {
        &self.shared.config
    }

    /// Add files to the queue and start as many as the ceiling allows.
    ///
    /// Returns the tasks as created, all `pending`.
    pub async fn enqueue(&self, uploads: Vec<NewUpload>) -> Vec<TaskProjection> {
        let shared = &self.shared;
        let mut guard = shared.core.write().await;
        let core = &mut *guard;

        let created = core.registry.enqueue(uploads);
        if created.is_empty() {
            return Vec::new();
        }

        for task in &created {
            shared.notifier.notify(UploadEvent::TaskQueued {
                id: task.id,
                file_name: task.file_name.clone(),
            });
        }
        tracing::info!(target: LOG_TARGET, count = created.len(), "Queued uploads");

        core.busy = true;
        let projections = created.iter().map(UploadTask::projection).collect();
        shared.tick(core);
        shared.writer.save(core.registry.snapshot());

        projections
    }

    /// Abort every running transfer and stop admitting new ones.
    ///
    /// Aborted tasks become `paused`; pending and finished tasks are left
    /// alone. Returns how many transfers were aborted. Pausing an already
    /// paused queue does nothing.
    pub async fn pause(&self) -> usize {
        let shared = &self.shared;
        let mut guard = shared.core.write().await;
        let core = &mut *guard;

        if core.scheduler.is_paused() {
            return 0;
        }
        core.scheduler.pause();

        let aborted = core.abort_all();
        for id in &aborted {
            if let Err(e) = core.registry.transition(id, UploadStatus::Paused, None) {
                tracing::debug!(target: LOG_TARGET, id = %id, error = %e, "Pause transition rejected");
            }
        }

        shared.notifier.notify(UploadEvent::QueuePaused {
            aborted: aborted.len(),
        });
        shared.writer.save(core.registry.snapshot());
        tracing::info!(target: LOG_TARGET, aborted = aborted.len(), "Queue paused");

        aborted.len()
    }

    /// Return paused tasks to `pending` (progress reset) and resume admission.
    ///
    /// Returns how many tasks were re-queued.
    pub async fn resume(&self) -> usize {
        let shared = &self.shared;
        let mut guard = shared.core.write().await;
        let core = &mut *guard;

        core.scheduler.resume();

        let mut requeued = 0;
        for id in core.registry.ids_with_status(UploadStatus::Paused) {
            match core.registry.transition(&id, UploadStatus::Pending, None) {
                Ok(_) => requeued += 1,
                Err(e) => {
                    tracing::debug!(target: LOG_TARGET, id = %id, error = %e, "Resume transition rejected");
                }
            }
        }
        if requeued > 0 {
            core.busy = true;
        }

        shared.notifier.notify(UploadEvent::QueueResumed { requeued });
        tracing::info!(target: LOG_TARGET, requeued, "Queue resumed");

        shared.tick(core);
        shared.writer.save(core.registry.snapshot());
        shared.check_drained(core);

        requeued
    }

    /// Remove a task, aborting its transfer if one is running.
    ///
    /// Unknown ids and finished tasks are ignored (logged) and return `false`.
    pub async fn cancel(&self, id: &UploadId) -> bool {
        let shared = &self.shared;
        let mut guard = shared.core.write().await;
        let core = &mut *guard;

        let Some(status) = core.registry.get(id).map(UploadTask::status) else {
            tracing::debug!(target: LOG_TARGET, id = %id, "Cancel ignored: unknown upload");
            return false;
        };
        if status.is_terminal() {
            tracing::debug!(target: LOG_TARGET, id = %id, status = %status, "Cancel ignored: upload already finished");
            return false;
        }

        if let Some(transfer) = core.active.remove(id) {
            transfer.cancel.cancel();
            tracing::info!(target: LOG_TARGET, id = %id, "Cancelled active upload");
        }
        core.registry.remove(id);
        shared.notifier.notify(UploadEvent::TaskCancelled { id: *id });
        tracing::info!(target: LOG_TARGET, id = %id, "Removed upload from queue");

        shared.tick(core);
        shared.writer.save(core.registry.snapshot());
        shared.check_drained(core);

        true
    }

    /// Manually retry a `failed` task: its retry count resets to 0 and it
    /// becomes `pending` again at its original place in enqueue order.
    ///
    /// Returns `false` (logged) if the task is unknown or not failed.
    pub async fn retry(&self, id: &UploadId) -> bool {
        let shared = &self.shared;
        let mut guard = shared.core.write().await;
        let core = &mut *guard;

        let status = core.registry.get(id).map(UploadTask::status);
        if status != Some(UploadStatus::Failed) {
            tracing::debug!(target: LOG_TARGET, id = %id, status = ?status, "Retry ignored: upload is not failed");
            return false;
        }

        let file_name = match core.registry.transition(id, UploadStatus::Pending, None) {
            Ok(task) => task.file_name.clone(),
            Err(e) => {
                tracing::debug!(target: LOG_TARGET, id = %id, error = %e, "Retry transition rejected");
                return false;
            }
        };

        core.busy = true;
        shared
            .notifier
            .notify(UploadEvent::TaskQueued { id: *id, file_name });
        tracing::info!(target: LOG_TARGET, id = %id, "Retrying failed upload");

        shared.tick(core);
        shared.writer.save(core.registry.snapshot());

        true
    }

    /// Abort everything, empty the queue and remove the persisted snapshot.
    ///
    /// Unfinished tasks get a `TaskCancelled` event; no `AllComplete` fires.
    pub async fn clear(&self) {
        let shared = &self.shared;
        let mut guard = shared.core.write().await;
        let core = &mut *guard;

        let aborted = core.abort_all();
        let snapshot = core.registry.snapshot();
        for task in snapshot.tasks.iter().filter(|t| !t.status.is_terminal()) {
            shared
                .notifier
                .notify(UploadEvent::TaskCancelled { id: task.id });
        }

        core.registry.clear();
        core.busy = false;
        shared.writer.clear();

        tracing::info!(
            target: LOG_TARGET,
            removed = snapshot.total,
            aborted = aborted.len(),
            "Queue cleared"
        );
    }

    /// Point-in-time view of every task.
    pub async fn state(&self) -> QueueState {
        self.shared.core.read().await.registry.snapshot()
    }

    /// One task's projection.
    pub async fn task(&self, id: &UploadId) -> Option<TaskProjection> {
        self.shared
            .core
            .read()
            .await
            .registry
            .get(id)
            .map(UploadTask::projection)
    }

    /// Whether admission is suspended.
    pub async fn is_paused(&self) -> bool {
        self.shared.core.read().await.scheduler.is_paused()
    }

    /// Transfers currently holding a slot.
    pub async fn active_count(&self) -> usize {
        self.shared.core.read().await.active.len()
    }

    /// Tasks waiting for admission.
    pub async fn pending_count(&self) -> usize {
        self.shared
            .core
            .read()
            .await
            .registry
            .count(UploadStatus::Pending)
    }

    /// Load the persisted snapshot from a previous session, if still fresh.
    pub async fn restore(&self) -> Option<PersistedSnapshot> {
        self.shared.writer.flush().await;
        self.shared.persistence.load().await
    }

    /// Re-queue an unfinished task from a persisted snapshot.
    ///
    /// The task keeps its id and write target and starts over as `pending`
    /// with progress and retry count reset. `source` must yield the same
    /// bytes as the original file.
    pub async fn reattach(
        &self,
        projection: &TaskProjection,
        source: Arc<dyn UploadSource>,
    ) -> Result<UploadId, UploadError> {
        let shared = &self.shared;
        let mut guard = shared.core.write().await;
        let core = &mut *guard;

        let task = core.registry.reattach(projection, source)?;
        shared.notifier.notify(UploadEvent::TaskQueued {
            id: task.id,
            file_name: task.file_name.clone(),
        });
        tracing::info!(target: LOG_TARGET, id = %task.id, "Re-attached upload from snapshot");

        core.busy = true;
        shared.tick(core);
        shared.writer.save(core.registry.snapshot());

        Ok(task.id)
    }

    /// Wait until every state change so far has reached the store.
    pub async fn flush(&self) {
        self.shared.writer.flush().await;
    }

    /// Abort every in-flight transfer and stop admitting.
    ///
    /// The registry is left as it is; the last persisted snapshot still
    /// describes the interrupted tasks.
    pub fn shutdown(&self) {
        if !self.shared.shutdown.is_cancelled() {
            tracing::info!(target: LOG_TARGET, "Upload queue shutting down");
            self.shared.shutdown.cancel();
        }
    }
}

impl Drop for UploadQueue {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

impl Shared {
    fn next_lease(&self) -> LeaseId {
        LeaseId(self.lease_counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Admit pending tasks until the ceiling is reached.
    fn tick(self: &Arc<Self>, core: &mut QueueCore) {
        if self.shutdown.is_cancelled() {
            return;
        }

        while let Some(task) = core
            .scheduler
            .admit_next(&mut core.registry, core.active.len())
        {
            let lease = self.next_lease();
            let cancel = self.shutdown.child_token();
            core.active.insert(
                task.id,
                ActiveTransfer {
                    lease,
                    cancel: cancel.clone(),
                },
            );

            self.notifier.notify(UploadEvent::TaskStarted {
                id: task.id,
                attempt: task.retry_count(),
            });
            tracing::debug!(
                target: LOG_TARGET,
                id = %task.id,
                attempt = task.retry_count(),
                active = core.active.len(),
                "Admitted upload"
            );

            self.spawn_transfer(&task, lease, cancel);
        }
    }

    fn spawn_transfer(self: &Arc<Self>, task: &UploadTask, lease: LeaseId, cancel: CancellationToken) {
        let (progress_tx, progress_rx) = watch::channel(0u8);
        let job = TransferJob::for_task(task, cancel.clone(), progress_tx);
        let id = task.id;
        let failures = task.retry_count();
        let shared = Arc::clone(self);

        tokio::spawn(async move {
            let bridge = shared.spawn_progress_bridge(id, lease, progress_rx);
            let mut outcome = run_job(job, shared.transport.as_ref()).await;

            // The job dropped its sender; the bridge drains the last value
            // and exits, so no progress can trail the terminal event.
            if let Err(e) = bridge.await {
                tracing::warn!(target: LOG_TARGET, id = %id, error = %e, "Progress bridge failed");
            }

            let retrying = matches!(
                settle(&outcome, failures, shared.config.max_retries),
                Settlement::Retry { .. }
            );
            if retrying && !backoff(shared.config.retry_delay, &cancel).await {
                outcome = TransferOutcome::Aborted;
            }

            shared.finalize(id, lease, outcome).await;
        });
    }

    fn spawn_progress_bridge(
        self: &Arc<Self>,
        id: UploadId,
        lease: LeaseId,
        mut rx: watch::Receiver<u8>,
    ) -> JoinHandle<()> {
        let shared = Arc::clone(self);

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let progress = *rx.borrow_and_update();
                shared.apply_progress(id, lease, progress).await;
            }
            let last = *rx.borrow();
            shared.apply_progress(id, lease, last).await;
        })
    }

    async fn apply_progress(&self, id: UploadId, lease: LeaseId, progress: u8) {
        let mut guard = self.core.write().await;
        let core = &mut *guard;

        if !core.holds_lease(&id, lease) {
            return;
        }

        match core.registry.record_progress(&id, progress) {
            Ok(Some(progress)) => {
                self.notifier.notify(UploadEvent::progress(id, progress));
                self.writer.save(core.registry.snapshot());
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(target: LOG_TARGET, id = %id, error = %e, "Progress update rejected");
            }
        }
    }

    /// Apply a finished attempt to the registry.
    async fn finalize(self: &Arc<Self>, id: UploadId, lease: LeaseId, outcome: TransferOutcome) {
        let mut guard = self.core.write().await;
        let core = &mut *guard;

        if !core.verify_and_remove_lease(&id, lease) {
            tracing::debug!(target: LOG_TARGET, id = %id, "Ignoring stale finalize (lease mismatch)");
            return;
        }
        if self.shutdown.is_cancelled() {
            tracing::debug!(target: LOG_TARGET, id = %id, "Ignoring finalize after shutdown");
            return;
        }

        let failures = core.registry.get(&id).map_or(0, UploadTask::retry_count);
        match settle(&outcome, failures, self.config.max_retries) {
            Settlement::Complete => self.handle_success(core, id),
            Settlement::Retry { error } => self.handle_retry(core, id, error),
            Settlement::Fail { error } => self.handle_failure(core, id, error),
            Settlement::Discard => {
                tracing::debug!(target: LOG_TARGET, id = %id, "Transfer aborted");
            }
        }

        self.tick(core);
        self.writer.save(core.registry.snapshot());
        self.check_drained(core);
    }

    fn handle_success(&self, core: &mut QueueCore, id: UploadId) {
        match core.registry.transition(&id, UploadStatus::Completed, None) {
            Ok(task) => {
                tracing::info!(target: LOG_TARGET, id = %id, file = %task.file_name, "Upload completed");
                self.notifier.notify(UploadEvent::TaskCompleted {
                    id,
                    public_url: task.target.public_url.clone(),
                });
            }
            Err(e) => {
                tracing::debug!(target: LOG_TARGET, id = %id, error = %e, "Completion transition rejected");
            }
        }
    }

    fn handle_retry(&self, core: &mut QueueCore, id: UploadId, error: String) {
        match core.registry.transition(&id, UploadStatus::Pending, None) {
            Ok(task) => {
                tracing::info!(
                    target: LOG_TARGET,
                    id = %id,
                    retry_count = task.retry_count(),
                    error = %error,
                    "Upload failed; retrying"
                );
                self.notifier.notify(UploadEvent::TaskRetrying {
                    id,
                    retry_count: task.retry_count(),
                    error,
                });
            }
            Err(e) => {
                tracing::debug!(target: LOG_TARGET, id = %id, error = %e, "Retry transition rejected");
            }
        }
    }

    fn handle_failure(&self, core: &mut QueueCore, id: UploadId, error: String) {
        match core
            .registry
            .transition(&id, UploadStatus::Failed, Some(error.clone()))
        {
            Ok(task) => {
                tracing::warn!(
                    target: LOG_TARGET,
                    id = %id,
                    retry_count = task.retry_count(),
                    error = %error,
                    "Upload failed"
                );
                self.notifier
                    .notify(UploadEvent::failed(id, error, task.retry_count()));
            }
            Err(e) => {
                tracing::debug!(target: LOG_TARGET, id = %id, error = %e, "Failure transition rejected");
            }
        }
    }

    /// Fire `AllComplete` on the busy to drained edge.
    ///
    /// While paused, tasks parked as `paused` still count as unfinished work.
    fn check_drained(&self, core: &mut QueueCore) {
        let parked = core.scheduler.is_paused() && core.registry.count(UploadStatus::Paused) > 0;
        let drained = core.busy
            && !parked
            && core.active.is_empty()
            && core.registry.next_pending().is_none();
        if !drained {
            return;
        }

        core.busy = false;
        let completed = core.registry.count(UploadStatus::Completed);
        let failed = core.registry.count(UploadStatus::Failed);
        tracing::info!(target: LOG_TARGET, completed, failed, "Upload queue drained");
        self.notifier
            .notify(UploadEvent::AllComplete { completed, failed });
    }
}
