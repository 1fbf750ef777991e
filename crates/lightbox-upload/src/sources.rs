//! Byte sources behind upload tasks.
//!
//! Both sources re-open from the first byte on every call, so a retry or a
//! resume always streams the whole file again.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::BufReader;

use lightbox_core::{ByteReader, NewUpload, UploadError, UploadSource, WriteTarget};

/// Content type sent when the extension is not recognised.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Bytes held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    bytes: Bytes,
}

impl MemorySource {
    /// Wrap `bytes`.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether the source is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[async_trait]
impl UploadSource for MemorySource {
    async fn open(&self) -> Result<ByteReader, UploadError> {
        Ok(Box::new(Cursor::new(self.bytes.clone())))
    }
}

/// A file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Describe a file for enqueueing: size from metadata, display name from
    /// the file name, content type from the extension.
    pub async fn describe(
        path: impl Into<PathBuf>,
        target: WriteTarget,
    ) -> Result<NewUpload, UploadError> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| UploadError::from_io_error(&e))?;
        if !metadata.is_file() {
            return Err(UploadError::other(format!(
                "'{}' is not a regular file",
                path.display()
            )));
        }

        let file_name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let file_type = guess_content_type(&path);

        Ok(NewUpload::new(
            file_name,
            metadata.len(),
            file_type,
            target,
            Arc::new(Self::new(path)),
        ))
    }
}

#[async_trait]
impl UploadSource for FileSource {
    async fn open(&self) -> Result<ByteReader, UploadError> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| UploadError::from_io_error(&e))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Guess a MIME type from the file extension.
///
/// Covers the photo, raw and video formats a shoot typically produces.
pub fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("heif") => "image/heif",
        Some("tif" | "tiff") => "image/tiff",
        Some("dng") => "image/x-adobe-dng",
        Some("cr2") => "image/x-canon-cr2",
        Some("cr3") => "image/x-canon-cr3",
        Some("nef") => "image/x-nikon-nef",
        Some("arw") => "image/x-sony-arw",
        Some("raf") => "image/x-fuji-raf",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        _ => FALLBACK_CONTENT_TYPE,
    }
}
