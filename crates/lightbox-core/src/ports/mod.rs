//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the upload engine expects from
//! infrastructure. They contain no implementation details and use only
//! domain types.
//!
//! # Design Rules
//!
//! - No `reqwest` or `sqlx` types in any signature
//! - No cancellation primitives: the engine aborts a transfer by dropping
//!   its future
//! - Storage is a byte-oriented key-value interface, serialization stays in
//!   the engine

pub mod event_emitter;
pub mod kv_store;
pub mod source;
pub mod transport;

pub use event_emitter::{NoopUploadEmitter, ObserverEmitter, UploadEventEmitterPort, UploadObserver};
pub use kv_store::{KeyValueStorePort, StoreError};
pub use source::{ByteReader, UploadSource};
pub use transport::{ProgressSink, TransferRequest, UploadTransportPort};
