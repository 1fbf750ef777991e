//! Upload transport port.
//!
//! The storage backend is opaque: "send a byte stream to a pre-authorized
//! URL, report progress, succeed or fail".

use std::sync::Arc;

use async_trait::async_trait;

use super::source::ByteReader;
use crate::upload::{UploadError, UploadId, WriteTarget};

/// Callback receiving the cumulative number of bytes the remote side has
/// taken so far.
pub type ProgressSink = Arc<dyn Fn(u64) + Send + Sync>;

/// Everything a transport needs to send one file.
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    /// Task being transferred (for logging).
    pub id: UploadId,
    /// Destination.
    pub target: &'a WriteTarget,
    /// Sent as `Content-Type`.
    pub content_type: &'a str,
    /// Exact body length in bytes.
    pub content_length: u64,
}

/// Port for the byte transfer itself.
///
/// Implementations report progress for bytes the connection has accepted,
/// not bytes read from disk, and must be cancel-safe: the engine aborts an
/// in-flight transfer by dropping the returned future.
#[async_trait]
pub trait UploadTransportPort: Send + Sync {
    /// Send `body` to `request.target`.
    ///
    /// Returns `Ok(())` on a 2xx-equivalent outcome, an
    /// `UploadError::Transport` otherwise.
    async fn put(
        &self,
        request: TransferRequest<'_>,
        body: ByteReader,
        on_progress: ProgressSink,
    ) -> Result<(), UploadError>;
}
