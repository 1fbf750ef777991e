//! Integration tests for the `UploadQueue`.
//!
//! These tests drive the queue end to end with fake transports. No network
//! or disk is involved: bytes come from `MemorySource`, the snapshot lives
//! in a `MemoryKvStore`, and events are pulled from a `ChannelEmitter`.
//!
//! # What is tested
//!
//! - Concurrency ceiling with 20 tasks, and the 7-file admission scenario
//! - Automatic retry exhaustion, and recovery after two failures
//! - Manual retry of a failed task
//! - Pause/resume restarting transfers from byte 0
//! - `AllComplete` firing exactly once per drain
//! - Cancelling pending and active tasks
//! - Stale snapshot rejection and re-attach from a fresh snapshot
//! - Clear and teardown aborting in-flight transfers
//! - Per-task progress ordering
//! - Admissions made while finalizing reach the store
//! - Draining a paused queue by cancelling its last task
//! - Callback delivery through `ObserverEmitter`

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Notify, Semaphore};
use tokio::sync::mpsc::UnboundedReceiver;

use lightbox_upload::{
    ByteReader, ChannelEmitter, KeyValueStorePort, MemoryKvStore, MemorySource, NewUpload,
    ObserverEmitter, PersistedSnapshot, ProgressSink, QueueState, TaskProjection,
    TransferRequest, UploadError, UploadEvent, UploadId, UploadObserver, UploadQueue,
    UploadQueueConfig, UploadQueueDeps, UploadStatus, UploadTransportPort, WriteTarget,
    build_upload_queue,
};

const WAIT: Duration = Duration::from_secs(5);
const STORAGE_KEY: &str = "lightbox_upload_queue";

// ── Fake transports ────────────────────────────────────────────────

/// Holds every transfer at 50% until the test adds permits to `gate`.
struct GatedTransport {
    gate: Semaphore,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: Mutex<Vec<String>>,
}

/// Decrements `in_flight` when a transfer ends or is dropped mid-way.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GatedTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
        })
    }

    fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn attempts_for(&self, key: &str) -> usize {
        self.started
            .lock()
            .unwrap()
            .iter()
            .filter(|k| k.as_str() == key)
            .count()
    }
}

#[async_trait]
impl UploadTransportPort for GatedTransport {
    async fn put(
        &self,
        request: TransferRequest<'_>,
        _body: ByteReader,
        on_progress: ProgressSink,
    ) -> Result<(), UploadError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.started
            .lock()
            .unwrap()
            .push(request.target.key.clone());

        on_progress(request.content_length / 2);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| UploadError::transport(e.to_string()))?;
        permit.forget();
        on_progress(request.content_length);
        Ok(())
    }
}

/// Fails a configured number of times per key, then succeeds.
#[derive(Default)]
struct ScriptedTransport {
    failures: Mutex<HashMap<String, u32>>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl ScriptedTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn fail(self: Arc<Self>, key: &str, times: u32) -> Arc<Self> {
        self.failures.lock().unwrap().insert(key.to_string(), times);
        self
    }

    fn attempts(&self, key: &str) -> u32 {
        self.attempts.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl UploadTransportPort for ScriptedTransport {
    async fn put(
        &self,
        request: TransferRequest<'_>,
        _body: ByteReader,
        on_progress: ProgressSink,
    ) -> Result<(), UploadError> {
        let key = request.target.key.clone();
        *self.attempts.lock().unwrap().entry(key.clone()).or_default() += 1;

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(UploadError::transport_with_status("HTTP 503", 503));
                }
            }
        }

        on_progress(request.content_length);
        Ok(())
    }
}

/// Reports progress in small steps, yielding between them.
struct SteppingTransport;

#[async_trait]
impl UploadTransportPort for SteppingTransport {
    async fn put(
        &self,
        request: TransferRequest<'_>,
        _body: ByteReader,
        on_progress: ProgressSink,
    ) -> Result<(), UploadError> {
        let step = (request.content_length / 20).max(1);
        let mut sent = 0;
        while sent < request.content_length {
            sent = (sent + step).min(request.content_length);
            on_progress(sent);
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

/// Completes every key at once except `stalled`, which never finishes and
/// never reports progress.
struct StallingTransport {
    stalled: &'static str,
}

#[async_trait]
impl UploadTransportPort for StallingTransport {
    async fn put(
        &self,
        request: TransferRequest<'_>,
        _body: ByteReader,
        _on_progress: ProgressSink,
    ) -> Result<(), UploadError> {
        if request.target.key == self.stalled {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// Observer recording the callbacks it receives.
#[derive(Default)]
struct RecordingObserver {
    calls: Mutex<Vec<String>>,
    drained: Notify,
}

impl UploadObserver for RecordingObserver {
    fn on_progress(&self, _id: UploadId, progress: u8) {
        self.calls.lock().unwrap().push(format!("progress:{progress}"));
    }

    fn on_complete(&self, _id: UploadId, public_url: &str) {
        self.calls.lock().unwrap().push(format!("complete:{public_url}"));
    }

    fn on_failed(&self, _id: UploadId, error: &str) {
        self.calls.lock().unwrap().push(format!("failed:{error}"));
    }

    fn on_all_complete(&self) {
        self.calls.lock().unwrap().push("drained".to_string());
        self.drained.notify_one();
    }
}

// ── Helpers ────────────────────────────────────────────────────────

struct Harness {
    queue: UploadQueue,
    events: UnboundedReceiver<UploadEvent>,
    store: Arc<MemoryKvStore>,
}

fn harness_with_store<T>(
    transport: Arc<T>,
    config: UploadQueueConfig,
    store: Arc<MemoryKvStore>,
) -> Harness
where
    T: UploadTransportPort + 'static,
{
    let (emitter, events) = ChannelEmitter::new();
    let queue = build_upload_queue(UploadQueueDeps {
        transport,
        store: Arc::clone(&store),
        emitter: Arc::new(emitter),
        config,
    });
    Harness {
        queue,
        events,
        store,
    }
}

fn harness<T>(transport: Arc<T>) -> Harness
where
    T: UploadTransportPort + 'static,
{
    harness_with_store(
        transport,
        UploadQueueConfig::default(),
        Arc::new(MemoryKvStore::new()),
    )
}

fn photo(key: &str) -> NewUpload {
    NewUpload::new(
        format!("{key}.jpg"),
        1000,
        "image/jpeg",
        WriteTarget::new(
            format!("https://put.example/{key}?sig=x"),
            format!("https://cdn.example/{key}.jpg"),
            key,
        ),
        Arc::new(MemorySource::new(vec![0u8; 1000])),
    )
}

fn photos(n: usize) -> Vec<NewUpload> {
    (0..n).map(|i| photo(&format!("photo-{i:02}"))).collect()
}

/// Receive events until `done` matches one, returning all of them.
async fn wait_for(
    events: &mut UnboundedReceiver<UploadEvent>,
    mut done: impl FnMut(&UploadEvent) -> bool,
) -> Vec<UploadEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        let matched = done(&event);
        seen.push(event);
        if matched {
            return seen;
        }
    }
}

/// Receive events until `n` of them match `pred`.
async fn wait_for_n(
    events: &mut UnboundedReceiver<UploadEvent>,
    n: usize,
    pred: impl Fn(&UploadEvent) -> bool,
) -> Vec<UploadEvent> {
    let mut count = 0;
    wait_for(events, |e| {
        if pred(e) {
            count += 1;
        }
        count == n
    })
    .await
}

/// Events that arrive within a short quiet period.
async fn drain_quiet(events: &mut UnboundedReceiver<UploadEvent>) -> Vec<UploadEvent> {
    let mut seen = Vec::new();
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(100), events.recv()).await
    {
        seen.push(event);
    }
    seen
}

async fn until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn is_started(e: &UploadEvent) -> bool {
    matches!(e, UploadEvent::TaskStarted { .. })
}

fn is_completed(e: &UploadEvent) -> bool {
    matches!(e, UploadEvent::TaskCompleted { .. })
}

fn is_all_complete(e: &UploadEvent) -> bool {
    matches!(e, UploadEvent::AllComplete { .. })
}

fn count(events: &[UploadEvent], pred: impl Fn(&UploadEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

async fn stored_snapshot(store: &MemoryKvStore) -> Option<PersistedSnapshot> {
    store
        .get(STORAGE_KEY)
        .await
        .unwrap()
        .map(|raw| serde_json::from_slice(&raw).unwrap())
}

// ── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ceiling_holds_for_twenty_tasks() {
    let transport = GatedTransport::new();
    let mut h = harness(Arc::clone(&transport));

    let created = h.queue.enqueue(photos(20)).await;
    assert_eq!(created.len(), 20);
    assert!(created.iter().all(|t| t.status == UploadStatus::Pending));

    let state = h.queue.state().await;
    assert_eq!(state.uploading, 5);
    assert_eq!(state.pending, 15);

    transport.release(20);
    let events = wait_for(&mut h.events, is_all_complete).await;

    // Replay the event stream: started minus finished never exceeds 5
    let mut running = 0usize;
    let mut peak = 0usize;
    for event in &events {
        match event {
            UploadEvent::TaskStarted { .. } => running += 1,
            UploadEvent::TaskCompleted { .. } | UploadEvent::TaskFailed { .. } => running -= 1,
            _ => {}
        }
        peak = peak.max(running);
    }
    assert_eq!(peak, 5);
    assert!(transport.max_in_flight.load(Ordering::SeqCst) <= 5);
    assert_eq!(count(&events, is_completed), 20);
    assert_eq!(
        events.last(),
        Some(&UploadEvent::AllComplete {
            completed: 20,
            failed: 0
        })
    );
}

#[tokio::test]
async fn test_seven_files_admit_five_then_one() {
    let transport = GatedTransport::new();
    let mut h = harness(Arc::clone(&transport));

    h.queue.enqueue(photos(7)).await;
    let state = h.queue.state().await;
    assert_eq!(state.uploading, 5);
    assert_eq!(state.pending, 2);
    assert_eq!(h.queue.active_count().await, 5);
    assert_eq!(h.queue.pending_count().await, 2);

    // Wait until all five transfers are parked at the gate
    until(|| transport.in_flight() == 5).await;

    transport.release(1);
    wait_for(&mut h.events, is_completed).await;
    let state = h.queue.state().await;
    assert_eq!(state.completed, 1);
    assert_eq!(state.uploading, 5);
    assert_eq!(state.pending, 1);

    transport.release(1);
    wait_for(&mut h.events, is_completed).await;
    let state = h.queue.state().await;
    assert_eq!(state.completed, 2);
    assert_eq!(state.uploading, 5);
    assert_eq!(state.pending, 0);

    transport.release(1);
    wait_for(&mut h.events, is_completed).await;
    let state = h.queue.state().await;
    assert_eq!(state.uploading, 4);

    transport.release(4);
    wait_for(&mut h.events, is_all_complete).await;
    assert_eq!(h.queue.state().await.completed, 7);
}

#[tokio::test]
async fn test_retry_exhaustion_marks_failed() {
    let transport = ScriptedTransport::new().fail("photo-00", u32::MAX);
    let mut h = harness(Arc::clone(&transport));

    let id = h.queue.enqueue(photos(1)).await[0].id;
    let events = wait_for(&mut h.events, is_all_complete).await;

    let task = h.queue.task(&id).await.unwrap();
    assert_eq!(task.status, UploadStatus::Failed);
    assert_eq!(task.retry_count, 3);
    assert!(task.error.as_deref().unwrap().contains("503"));
    assert_eq!(transport.attempts("photo-00"), 3);

    assert_eq!(
        count(&events, |e| matches!(e, UploadEvent::TaskRetrying { .. })),
        2
    );
    let attempts: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            UploadEvent::TaskStarted { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![0, 1, 2]);
    assert!(events.iter().any(|e| matches!(
        e,
        UploadEvent::TaskFailed { retry_count: 3, .. }
    )));
    assert_eq!(
        events.last(),
        Some(&UploadEvent::AllComplete {
            completed: 0,
            failed: 1
        })
    );
}

#[tokio::test]
async fn test_two_failures_then_success_completes() {
    let transport = ScriptedTransport::new().fail("photo-00", 2);
    let mut h = harness(Arc::clone(&transport));

    let id = h.queue.enqueue(photos(1)).await[0].id;
    let events = wait_for(&mut h.events, is_all_complete).await;

    let task = h.queue.task(&id).await.unwrap();
    assert_eq!(task.status, UploadStatus::Completed);
    assert_eq!(task.progress, 100);
    assert!(task.error.is_none());
    assert_eq!(transport.attempts("photo-00"), 3);
    assert!(!events
        .iter()
        .any(|e| matches!(e, UploadEvent::TaskFailed { .. })));
}

#[tokio::test]
async fn test_manual_retry_resets_and_requeues() {
    let transport = ScriptedTransport::new().fail("photo-00", 3);
    let mut h = harness(Arc::clone(&transport));

    let id = h.queue.enqueue(photos(1)).await[0].id;
    wait_for(&mut h.events, is_all_complete).await;
    assert_eq!(h.queue.task(&id).await.unwrap().status, UploadStatus::Failed);

    assert!(h.queue.retry(&id).await);
    // Retrying something that is not failed is ignored
    assert!(!h.queue.retry(&id).await);
    assert!(!h.queue.retry(&UploadId::generate()).await);

    let events = wait_for(&mut h.events, is_all_complete).await;
    let task = h.queue.task(&id).await.unwrap();
    assert_eq!(task.status, UploadStatus::Completed);
    assert_eq!(task.retry_count, 0);
    assert!(events.iter().any(|e| matches!(
        e,
        UploadEvent::TaskStarted { attempt: 0, .. }
    )));
    assert_eq!(transport.attempts("photo-00"), 4);
}

#[tokio::test]
async fn test_pause_then_resume_restarts_transfers() {
    let transport = GatedTransport::new();
    let mut h = harness(Arc::clone(&transport));

    let ids: Vec<UploadId> = h
        .queue
        .enqueue(photos(3))
        .await
        .iter()
        .map(|t| t.id)
        .collect();
    wait_for_n(&mut h.events, 3, |e| {
        matches!(e, UploadEvent::TaskProgress { progress: 50, .. })
    })
    .await;

    assert_eq!(h.queue.pause().await, 3);
    assert!(h.queue.is_paused().await);
    assert_eq!(h.queue.pause().await, 0);

    let state = h.queue.state().await;
    assert_eq!(state.paused, 3);
    assert_eq!(state.uploading, 0);
    assert_eq!(h.queue.active_count().await, 0);
    until(|| transport.in_flight() == 0).await;

    // Admission is suspended while paused
    h.queue.enqueue(vec![photo("late")]).await;
    assert_eq!(h.queue.state().await.pending, 1);

    let while_paused = drain_quiet(&mut h.events).await;
    assert!(!while_paused.iter().any(|e| matches!(
        e,
        UploadEvent::TaskProgress { .. } | UploadEvent::TaskCompleted { .. }
    )));
    assert!(!while_paused.iter().any(is_all_complete));

    assert_eq!(h.queue.resume().await, 3);
    assert!(!h.queue.is_paused().await);

    // All four transfers parked at 50% before any is let through
    let mut events = wait_for_n(&mut h.events, 4, |e| {
        matches!(e, UploadEvent::TaskProgress { progress: 50, .. })
    })
    .await;
    transport.release(4);
    events.extend(wait_for(&mut h.events, is_all_complete).await);

    for id in &ids {
        let task = h.queue.task(id).await.unwrap();
        assert_eq!(task.status, UploadStatus::Completed);
        assert_eq!(task.retry_count, 0);

        // The restarted attempt reported progress from the beginning again
        let progress: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                UploadEvent::TaskProgress { id: pid, progress } if pid == id => Some(*progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![50, 100]);
    }
    for i in 0..3 {
        assert_eq!(transport.attempts_for(&format!("photo-{i:02}")), 2);
    }
}

#[tokio::test]
async fn test_all_complete_fires_once_per_drain() {
    let transport = ScriptedTransport::new();
    let mut h = harness(transport);

    h.queue.enqueue(photos(3)).await;
    let first = wait_for(&mut h.events, is_all_complete).await;
    assert_eq!(count(&first, is_all_complete), 1);
    assert!(drain_quiet(&mut h.events).await.is_empty());

    h.queue
        .enqueue(vec![photo("second-a"), photo("second-b")])
        .await;
    let second = wait_for(&mut h.events, is_all_complete).await;
    assert_eq!(
        second.last(),
        Some(&UploadEvent::AllComplete {
            completed: 5,
            failed: 0
        })
    );
    assert!(!drain_quiet(&mut h.events).await.iter().any(is_all_complete));
}

#[tokio::test]
async fn test_cancel_pending_and_active() {
    let transport = GatedTransport::new();
    let config = UploadQueueConfig::default().with_max_concurrent(1);
    let mut h = harness_with_store(
        Arc::clone(&transport),
        config,
        Arc::new(MemoryKvStore::new()),
    );

    let ids: Vec<UploadId> = h
        .queue
        .enqueue(photos(3))
        .await
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(h.queue.active_count().await, 1);

    // Pending task: removed at once, nothing else moves
    assert!(h.queue.cancel(&ids[2]).await);
    let state = h.queue.state().await;
    assert_eq!(state.total, 2);
    assert_eq!(state.uploading, 1);
    assert_eq!(state.pending, 1);
    assert!(h.queue.task(&ids[2]).await.is_none());
    assert!(!h.queue.cancel(&ids[2]).await);

    // Active task: transfer aborted, next one admitted
    until(|| transport.in_flight() == 1).await;
    assert!(h.queue.cancel(&ids[0]).await);
    let state = h.queue.state().await;
    assert_eq!(state.total, 1);
    assert_eq!(state.uploading, 1);
    assert_eq!(
        h.queue.task(&ids[1]).await.unwrap().status,
        UploadStatus::Uploading
    );

    transport.release(1);
    let events = wait_for(&mut h.events, is_all_complete).await;
    assert_eq!(
        count(&events, |e| matches!(e, UploadEvent::TaskCancelled { .. })),
        2
    );
    // Nothing is reported for a task after its cancellation
    let cancelled_at = events
        .iter()
        .position(|e| *e == UploadEvent::TaskCancelled { id: ids[0] })
        .unwrap();
    assert!(
        events[cancelled_at + 1..]
            .iter()
            .all(|e| e.task_id() != Some(ids[0]))
    );
    assert_eq!(transport.attempts_for("photo-02"), 0);
}

#[tokio::test]
async fn test_cancelling_last_pending_task_drains() {
    let transport = GatedTransport::new();
    let config = UploadQueueConfig::default().with_max_concurrent(1);
    let mut h = harness_with_store(
        Arc::clone(&transport),
        config,
        Arc::new(MemoryKvStore::new()),
    );

    let ids: Vec<UploadId> = h
        .queue
        .enqueue(photos(2))
        .await
        .iter()
        .map(|t| t.id)
        .collect();

    transport.release(1);
    wait_for(&mut h.events, is_completed).await;
    until(|| transport.in_flight() == 1).await;

    assert!(h.queue.cancel(&ids[1]).await);
    let events = wait_for(&mut h.events, is_all_complete).await;
    assert_eq!(
        events.last(),
        Some(&UploadEvent::AllComplete {
            completed: 1,
            failed: 0
        })
    );
    // Finished tasks cannot be cancelled
    assert!(!h.queue.cancel(&ids[0]).await);
}

#[tokio::test]
async fn test_every_mutation_is_persisted() {
    let transport = ScriptedTransport::new().fail("photo-01", u32::MAX);
    let mut h = harness(transport);

    h.queue.enqueue(photos(2)).await;
    wait_for(&mut h.events, is_all_complete).await;
    h.queue.flush().await;

    let snapshot = stored_snapshot(&h.store).await.unwrap();
    let state = QueueState::from_tasks(snapshot.queue);
    assert_eq!(state.completed, 1);
    assert_eq!(state.failed, 1);
    assert!(Utc::now() - snapshot.timestamp < chrono::Duration::minutes(1));

    let restored = h.queue.restore().await.unwrap();
    assert_eq!(restored.unfinished().count(), 1);
}

#[tokio::test]
async fn test_stale_snapshot_is_never_restored() {
    let store = Arc::new(MemoryKvStore::new());
    let mut old = QueueState::default();
    old.tasks.push(TaskProjection {
        id: UploadId::generate(),
        file_name: "IMG_0001.jpg".to_string(),
        file_size: 10,
        file_type: "image/jpeg".to_string(),
        upload_url: "https://put.example/expired".to_string(),
        public_url: "https://cdn.example/IMG_0001.jpg".to_string(),
        key: "IMG_0001".to_string(),
        status: UploadStatus::Uploading,
        progress: 40,
        error: None,
        retry_count: 0,
    });
    let stale = PersistedSnapshot::capture(&old, Utc::now() - chrono::Duration::hours(25));
    store
        .set(STORAGE_KEY, &serde_json::to_vec(&stale).unwrap())
        .await
        .unwrap();

    let h = harness_with_store(
        ScriptedTransport::new(),
        UploadQueueConfig::default(),
        Arc::clone(&store),
    );

    assert!(h.queue.restore().await.is_none());
    assert!(store.get(STORAGE_KEY).await.unwrap().is_none());
    assert_eq!(h.queue.state().await.total, 0);
}

#[tokio::test]
async fn test_reattach_resumes_unfinished_tasks() {
    let store = Arc::new(MemoryKvStore::new());

    // First session: one upload finishes, one is interrupted
    let first_id = {
        let transport = GatedTransport::new();
        let config = UploadQueueConfig::default().with_max_concurrent(1);
        let mut h = harness_with_store(Arc::clone(&transport), config, Arc::clone(&store));
        let ids: Vec<UploadId> = h
            .queue
            .enqueue(photos(2))
            .await
            .iter()
            .map(|t| t.id)
            .collect();
        transport.release(1);
        wait_for(&mut h.events, is_completed).await;
        wait_for(&mut h.events, |e| {
            matches!(e, UploadEvent::TaskProgress { progress: 50, .. })
        })
        .await;
        h.queue.flush().await;
        h.queue.shutdown();
        ids[1]
    };

    // Second session
    let transport = ScriptedTransport::new();
    let mut h = harness_with_store(
        Arc::clone(&transport),
        UploadQueueConfig::default(),
        Arc::clone(&store),
    );
    let snapshot = h.queue.restore().await.unwrap();
    let unfinished: Vec<_> = snapshot.unfinished().cloned().collect();
    assert_eq!(unfinished.len(), 1);
    assert_eq!(unfinished[0].id, first_id);
    assert_eq!(unfinished[0].status, UploadStatus::Uploading);

    let completed = snapshot
        .queue
        .iter()
        .find(|t| t.status == UploadStatus::Completed)
        .unwrap();
    let err = h
        .queue
        .reattach(completed, Arc::new(MemorySource::new(vec![0u8; 1000])))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::IllegalTransition { .. }));

    let id = h
        .queue
        .reattach(&unfinished[0], Arc::new(MemorySource::new(vec![0u8; 1000])))
        .await
        .unwrap();
    assert_eq!(id, first_id);

    wait_for(&mut h.events, is_all_complete).await;
    let task = h.queue.task(&id).await.unwrap();
    assert_eq!(task.status, UploadStatus::Completed);
    assert_eq!(task.upload_url, "https://put.example/photo-01?sig=x");
    assert_eq!(transport.attempts("photo-01"), 1);
}

#[tokio::test]
async fn test_clear_aborts_and_empties_without_drain_event() {
    let transport = GatedTransport::new();
    let mut h = harness(Arc::clone(&transport));

    h.queue.enqueue(photos(7)).await;
    until(|| transport.in_flight() == 5).await;

    h.queue.clear().await;
    h.queue.flush().await;

    assert_eq!(h.queue.state().await, QueueState::default());
    assert_eq!(h.queue.active_count().await, 0);
    until(|| transport.in_flight() == 0).await;
    assert!(stored_snapshot(&h.store).await.is_none());

    let events = drain_quiet(&mut h.events).await;
    assert!(!events.iter().any(is_all_complete));
    assert_eq!(
        count(&events, |e| matches!(e, UploadEvent::TaskCancelled { .. })),
        7
    );
}

#[tokio::test]
async fn test_dropping_queue_aborts_transfers() {
    let transport = GatedTransport::new();
    let h = harness(Arc::clone(&transport));

    h.queue.enqueue(photos(3)).await;
    until(|| transport.in_flight() == 3).await;

    drop(h);
    until(|| transport.in_flight() == 0).await;
    assert_eq!(transport.attempts_for("photo-00"), 1);
}

#[tokio::test]
async fn test_progress_is_ordered_per_task() {
    let mut h = harness(Arc::new(SteppingTransport));

    let ids: Vec<UploadId> = h
        .queue
        .enqueue(photos(8))
        .await
        .iter()
        .map(|t| t.id)
        .collect();
    let events = wait_for(&mut h.events, is_all_complete).await;

    for id in &ids {
        let mine: Vec<&UploadEvent> = events
            .iter()
            .filter(|e| e.task_id() == Some(*id))
            .collect();
        let progress: Vec<u8> = mine
            .iter()
            .filter_map(|e| match e {
                UploadEvent::TaskProgress { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect();

        assert!(!progress.is_empty());
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
        assert!(progress.iter().all(|p| *p <= 100));
        assert!(matches!(
            mine.last(),
            Some(UploadEvent::TaskCompleted { .. })
        ));
    }
}

#[tokio::test(start_paused = true)]
async fn test_retry_delay_holds_slot() {
    let transport = ScriptedTransport::new().fail("photo-00", 1);
    let config = UploadQueueConfig::default()
        .with_max_concurrent(1)
        .with_retry_delay(Duration::from_secs(30));
    let mut h = harness_with_store(
        Arc::clone(&transport),
        config,
        Arc::new(MemoryKvStore::new()),
    );

    h.queue.enqueue(photos(2)).await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    // Still backing off: the slot is held and the second task waits
    assert_eq!(transport.attempts("photo-00"), 1);
    assert_eq!(transport.attempts("photo-01"), 0);
    assert_eq!(h.queue.pending_count().await, 1);

    tokio::time::sleep(Duration::from_secs(25)).await;
    let events = wait_for(&mut h.events, is_all_complete).await;
    assert_eq!(count(&events, is_completed), 2);
    assert_eq!(transport.attempts("photo-00"), 2);
}

#[tokio::test]
async fn test_admission_on_finalize_is_persisted() {
    let transport = Arc::new(StallingTransport {
        stalled: "photo-01",
    });
    let config = UploadQueueConfig::default().with_max_concurrent(1);
    let mut h = harness_with_store(transport, config, Arc::new(MemoryKvStore::new()));

    let ids: Vec<UploadId> = h
        .queue
        .enqueue(photos(2))
        .await
        .iter()
        .map(|t| t.id)
        .collect();
    wait_for(&mut h.events, is_completed).await;
    wait_for(&mut h.events, |e| {
        matches!(e, UploadEvent::TaskStarted { id, .. } if *id == ids[1])
    })
    .await;
    h.queue.flush().await;

    assert_eq!(
        h.queue.task(&ids[1]).await.unwrap().status,
        UploadStatus::Uploading
    );
    let stored = stored_snapshot(&h.store).await.unwrap();
    let status_of = |id: &UploadId| {
        stored
            .queue
            .iter()
            .find(|t| t.id == *id)
            .map(|t| t.status)
            .unwrap()
    };
    assert_eq!(status_of(&ids[0]), UploadStatus::Completed);
    assert_eq!(status_of(&ids[1]), UploadStatus::Uploading);
}

#[tokio::test]
async fn test_cancelling_last_task_while_paused_drains() {
    let transport = GatedTransport::new();
    let mut h = harness(Arc::clone(&transport));

    let id = h.queue.enqueue(vec![photo("solo")]).await[0].id;
    until(|| transport.in_flight() == 1).await;

    assert_eq!(h.queue.pause().await, 1);
    assert!(h.queue.cancel(&id).await);

    let events = wait_for(&mut h.events, is_all_complete).await;
    assert!(matches!(
        events.last(),
        Some(UploadEvent::AllComplete {
            completed: 0,
            failed: 0
        })
    ));
    assert_eq!(h.queue.state().await.total, 0);
    assert!(h.queue.is_paused().await);

    // Resuming an empty queue reports nothing new
    h.queue.resume().await;
    let after = drain_quiet(&mut h.events).await;
    assert!(!after.iter().any(is_all_complete));
}

#[tokio::test]
async fn test_paused_tasks_hold_back_drain() {
    let transport = GatedTransport::new();
    let mut h = harness(Arc::clone(&transport));

    let ids: Vec<UploadId> = h
        .queue
        .enqueue(photos(2))
        .await
        .iter()
        .map(|t| t.id)
        .collect();
    until(|| transport.in_flight() == 2).await;

    h.queue.pause().await;
    h.queue.cancel(&ids[0]).await;

    let events = drain_quiet(&mut h.events).await;
    assert!(!events.iter().any(is_all_complete));
    assert_eq!(h.queue.state().await.paused, 1);
}

#[tokio::test]
async fn test_observer_receives_callbacks() {
    let transport = ScriptedTransport::new().fail("photo-01", 3);
    let emitter = Arc::new(ObserverEmitter::new(RecordingObserver::default()));
    let queue = build_upload_queue(UploadQueueDeps {
        transport,
        store: Arc::new(MemoryKvStore::new()),
        emitter: Arc::clone(&emitter),
        config: UploadQueueConfig::default(),
    });

    queue.enqueue(photos(2)).await;
    tokio::time::timeout(WAIT, emitter.observer().drained.notified())
        .await
        .expect("observer never saw the drain");

    let calls = emitter.observer().calls.lock().unwrap().clone();
    assert!(calls.contains(&"progress:100".to_string()));
    assert!(calls.contains(&"complete:https://cdn.example/photo-00.jpg".to_string()));
    assert!(
        calls
            .iter()
            .any(|c| c.starts_with("failed:") && c.contains("503"))
    );
    assert_eq!(calls.last().map(String::as_str), Some("drained"));
    assert_eq!(calls.iter().filter(|c| *c == "drained").count(), 1);
}
