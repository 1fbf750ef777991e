//! Parallel upload queue for lightbox.
//!
//! Sends many large media files to pre-authorized storage URLs with a
//! bounded number of concurrent transfers, automatic retries, queue-wide
//! pause/resume and a persisted snapshot for resuming after a restart.
//!
//! - `registry` - canonical task list and its state machine
//! - `scheduler` - FIFO admission under the concurrency ceiling
//! - `executor` - one transfer attempt and how its outcome settles
//! - `persistence` - snapshot save/load through a key-value store
//! - `notifier` - serialized event delivery
//! - `UploadQueue` - the facade tying them together
//! - `transport`, `sources`, `store` - adapters for HTTP, files and memory

// Re-export core types for convenience
pub use lightbox_core::{
    ByteReader, KeyValueStorePort, NewUpload, NoopUploadEmitter, ObserverEmitter,
    PersistedSnapshot, ProgressSink, QueueState, StoreError, TaskProjection, TransferRequest,
    UploadError, UploadEvent, UploadEventEmitterPort, UploadId, UploadObserver, UploadSource,
    UploadStatus, UploadTransportPort, WriteTarget,
};

/// Tracing target for everything the engine logs.
pub(crate) const LOG_TARGET: &str = "lightbox.upload";

pub mod config;
pub mod executor;
pub mod registry;
pub mod scheduler;

mod manager;
mod notifier;
mod persistence;
mod sources;
mod store;
mod transport;

pub use config::{
    DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_RETRIES, DEFAULT_SNAPSHOT_MAX_AGE, DEFAULT_STORAGE_KEY,
    UploadQueueConfig,
};
pub use manager::{UploadQueue, UploadQueueDeps, build_upload_queue};
pub use notifier::{ChannelEmitter, EventNotifier};
pub use persistence::{PersistHandle, QueuePersistence};
pub use sources::{FALLBACK_CONTENT_TYPE, FileSource, MemorySource, guess_content_type};
pub use store::MemoryKvStore;
pub use transport::HttpPutTransport;
