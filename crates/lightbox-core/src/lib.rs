//! Core domain types and port definitions for the lightbox upload queue.
//!
//! This crate has no runtime or network dependencies. The engine lives in
//! `lightbox-upload`; storage adapters live in `lightbox-db`.
//!
//! - `upload` - ids, statuses, task projections, snapshots, events, errors
//! - `ports` - traits the engine expects from infrastructure
#![deny(unused_crate_dependencies)]

pub mod ports;
pub mod upload;

pub use ports::{
    ByteReader, KeyValueStorePort, NoopUploadEmitter, ObserverEmitter, ProgressSink, StoreError,
    TransferRequest, UploadEventEmitterPort, UploadObserver, UploadSource, UploadTransportPort,
};
pub use upload::{
    NewUpload, PersistedSnapshot, QueueState, TaskProjection, UploadError, UploadEvent, UploadId,
    UploadResult, UploadStatus, WriteTarget,
};
