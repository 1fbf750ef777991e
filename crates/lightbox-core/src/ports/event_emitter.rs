//! Upload event emitter port.
//!
//! This port abstracts event delivery so the queue can notify a UI without
//! coupling to how the UI consumes events (channels, callbacks, IPC).

use crate::upload::{UploadEvent, UploadId};

/// Port for emitting upload events.
///
/// The engine calls `emit` from a single dispatcher task, one event at a
/// time and never while holding its own locks, so implementations need no
/// locking of their own for ordering. This method should not block.
pub trait UploadEventEmitterPort: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: UploadEvent);
}

/// A no-op emitter for tests and headless contexts.
#[derive(Debug, Clone, Default)]
pub struct NoopUploadEmitter;

impl NoopUploadEmitter {
    /// Create a new no-op emitter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl UploadEventEmitterPort for NoopUploadEmitter {
    fn emit(&self, _event: UploadEvent) {}
}

/// Callback-style observer for the four events a UI usually cares about.
///
/// Every method defaults to doing nothing; wrap an implementation in
/// `ObserverEmitter` to plug it into the queue.
pub trait UploadObserver: Send + Sync {
    /// A task's progress increased.
    fn on_progress(&self, _id: UploadId, _progress: u8) {}

    /// A task completed.
    fn on_complete(&self, _id: UploadId, _public_url: &str) {}

    /// A task exhausted its retries.
    fn on_failed(&self, _id: UploadId, _error: &str) {}

    /// The queue drained.
    fn on_all_complete(&self) {}
}

/// Adapter routing `UploadEvent`s to an `UploadObserver`.
#[derive(Debug, Clone, Default)]
pub struct ObserverEmitter<O> {
    observer: O,
}

impl<O: UploadObserver> ObserverEmitter<O> {
    /// Wrap an observer.
    pub const fn new(observer: O) -> Self {
        Self { observer }
    }

    /// Access the wrapped observer.
    pub const fn observer(&self) -> &O {
        &self.observer
    }
}

impl<O: UploadObserver> UploadEventEmitterPort for ObserverEmitter<O> {
    fn emit(&self, event: UploadEvent) {
        match event {
            UploadEvent::TaskProgress { id, progress } => self.observer.on_progress(id, progress),
            UploadEvent::TaskCompleted { id, public_url } => {
                self.observer.on_complete(id, &public_url);
            }
            UploadEvent::TaskFailed { id, error, .. } => self.observer.on_failed(id, &error),
            UploadEvent::AllComplete { .. } => self.observer.on_all_complete(),
            _ => {}
        }
    }
}
