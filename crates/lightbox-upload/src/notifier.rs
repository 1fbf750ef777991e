//! Event notifier.
//!
//! Every externally visible event passes through one unbounded channel to a
//! single dispatcher task, which hands them to the emitter one at a time.
//! The queue only ever sends while holding its lock, so channel order is the
//! order state changed in, and the emitter itself runs outside any lock.

use std::sync::Arc;

use tokio::sync::mpsc;

use lightbox_core::{UploadEvent, UploadEventEmitterPort};

use crate::LOG_TARGET;

/// Serializing front of an `UploadEventEmitterPort`.
#[derive(Debug, Clone)]
pub struct EventNotifier {
    tx: mpsc::UnboundedSender<UploadEvent>,
}

impl EventNotifier {
    /// Spawn the dispatcher task for `emitter`.
    ///
    /// The dispatcher exits once every clone of the notifier is dropped and
    /// the backlog has been delivered.
    pub fn spawn(emitter: Arc<dyn UploadEventEmitterPort>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<UploadEvent>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                emitter.emit(event);
            }
        });
        Self { tx }
    }

    /// Queue an event for delivery.
    pub fn notify(&self, event: UploadEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!(target: LOG_TARGET, "Event dispatcher gone; dropping event");
        }
    }
}

/// Emitter that forwards every event into an `mpsc` channel.
///
/// Useful for UIs that prefer pulling events and for tests.
#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<UploadEvent>,
}

impl ChannelEmitter {
    /// Create the emitter and the receiver it feeds.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UploadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl UploadEventEmitterPort for ChannelEmitter {
    fn emit(&self, event: UploadEvent) {
        // A closed receiver means nobody is listening any more
        let _ = self.tx.send(event);
    }
}
