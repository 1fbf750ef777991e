//! Persistence adapter.
//!
//! Serializes the registry's projection under a single key so an
//! interrupted session can be inspected and resumed. Failures never reach
//! the queue: they are logged and the session carries on in memory.
//!
//! Writes go through one background writer task. The queue sends a save
//! after every mutation; the writer drains whatever is waiting and applies
//! only the newest save or clear, so progress churn costs one write per
//! batch instead of one per percentage point.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use lightbox_core::{KeyValueStorePort, PersistedSnapshot, QueueState};

use crate::LOG_TARGET;

/// Reads and writes the persisted snapshot.
pub struct QueuePersistence {
    store: Arc<dyn KeyValueStorePort>,
    key: String,
    max_age: chrono::Duration,
}

impl QueuePersistence {
    /// Create an adapter over `store` using `key`.
    ///
    /// Snapshots older than `max_age` are treated as absent.
    pub fn new(store: Arc<dyn KeyValueStorePort>, key: impl Into<String>, max_age: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            max_age: chrono::Duration::from_std(max_age)
                .unwrap_or_else(|_| chrono::Duration::hours(24)),
        }
    }

    /// Key the snapshot lives under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Write `state` with the current timestamp.
    pub async fn save(&self, state: &QueueState) {
        let snapshot = PersistedSnapshot::capture(state, Utc::now());
        let bytes = match serde_json::to_vec(&snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "Failed to encode queue snapshot");
                return;
            }
        };

        if let Err(e) = self.store.set(&self.key, &bytes).await {
            tracing::warn!(target: LOG_TARGET, error = %e, "Failed to persist queue snapshot");
        }
    }

    /// Read the stored snapshot.
    ///
    /// Returns `None` when nothing is stored, when the record cannot be
    /// parsed, or when it is older than the age limit. The last two also
    /// remove the record.
    pub async fn load(&self) -> Option<PersistedSnapshot> {
        let bytes = match self.store.get(&self.key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "Failed to read queue snapshot");
                return None;
            }
        };

        let snapshot: PersistedSnapshot = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "Discarding unreadable queue snapshot");
                self.clear().await;
                return None;
            }
        };

        if snapshot.is_stale(Utc::now(), self.max_age) {
            tracing::info!(
                target: LOG_TARGET,
                written_at = %snapshot.timestamp,
                "Discarding stale queue snapshot"
            );
            self.clear().await;
            return None;
        }

        Some(snapshot)
    }

    /// Remove the stored snapshot.
    pub async fn clear(&self) {
        if let Err(e) = self.store.delete(&self.key).await {
            tracing::warn!(target: LOG_TARGET, error = %e, "Failed to clear queue snapshot");
        }
    }

    /// Start the background writer.
    ///
    /// The writer stops once every `PersistHandle` is dropped, after
    /// applying what was already sent.
    pub fn spawn_writer(self: Arc<Self>) -> PersistHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(self, rx));
        PersistHandle { tx }
    }
}

/// Instruction for the background writer.
#[derive(Debug)]
enum PersistCommand {
    Save(QueueState),
    Clear,
    Flush(oneshot::Sender<()>),
}

/// The newest write in a batch.
enum PendingWrite {
    Save(QueueState),
    Clear,
}

async fn run_writer(
    persistence: Arc<QueuePersistence>,
    mut rx: mpsc::UnboundedReceiver<PersistCommand>,
) {
    while let Some(first) = rx.recv().await {
        let mut latest = None;
        let mut acks = Vec::new();

        let mut next = Some(first);
        while let Some(command) = next {
            match command {
                PersistCommand::Save(state) => latest = Some(PendingWrite::Save(state)),
                PersistCommand::Clear => latest = Some(PendingWrite::Clear),
                PersistCommand::Flush(ack) => acks.push(ack),
            }
            next = rx.try_recv().ok();
        }

        match latest {
            Some(PendingWrite::Save(state)) => persistence.save(&state).await,
            Some(PendingWrite::Clear) => persistence.clear().await,
            None => {}
        }

        for ack in acks {
            let _ = ack.send(());
        }
    }

    tracing::debug!(target: LOG_TARGET, "Persistence writer stopped");
}

/// Sending half of the background writer.
#[derive(Debug, Clone)]
pub struct PersistHandle {
    tx: mpsc::UnboundedSender<PersistCommand>,
}

impl PersistHandle {
    /// Queue a save of `state`.
    pub fn save(&self, state: QueueState) {
        let _ = self.tx.send(PersistCommand::Save(state));
    }

    /// Queue removal of the stored snapshot.
    pub fn clear(&self) {
        let _ = self.tx.send(PersistCommand::Clear);
    }

    /// Wait until everything queued so far has been written.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(PersistCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}
