//! Upload domain types, events, and errors.
//!
//! Pure data types shared by the engine, the storage adapters and the UI
//! layer. No I/O happens here.
//!
//! # Structure
//!
//! - `types` - identifiers, statuses, write targets, task projections
//! - `state` - `QueueState` aggregate and the `PersistedSnapshot` layout
//! - `events` - the `UploadEvent` union delivered to observers
//! - `errors` - `UploadError`

pub mod errors;
pub mod events;
pub mod state;
pub mod types;

pub use errors::{UploadError, UploadResult};
pub use events::UploadEvent;
pub use state::{PersistedSnapshot, QueueState};
pub use types::{NewUpload, TaskProjection, UploadId, UploadStatus, WriteTarget};
