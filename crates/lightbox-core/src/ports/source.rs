//! Upload source port.

use std::fmt;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::upload::UploadError;

/// Boxed reader over a file's bytes.
pub type ByteReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// A re-openable byte stream behind one upload task.
///
/// Every attempt (first try, automatic retry, resume) opens the source
/// again and streams it from the first byte; transfers are never resumed
/// mid-file.
#[async_trait]
pub trait UploadSource: Send + Sync + fmt::Debug {
    /// Open a fresh reader positioned at byte 0.
    async fn open(&self) -> Result<ByteReader, UploadError>;
}
