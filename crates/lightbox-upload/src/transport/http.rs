//! HTTP PUT transport.
//!
//! Streams the body to a pre-signed URL. A chunk counts as sent once the
//! connection pulls the next one, and the full length is reported only
//! after a 2xx response, so progress tracks what the server has taken
//! rather than what was read from disk.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tokio_util::io::ReaderStream;

use lightbox_core::{ByteReader, ProgressSink, TransferRequest, UploadError, UploadTransportPort};

use crate::LOG_TARGET;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// `UploadTransportPort` sending one `PUT` per attempt.
#[derive(Debug, Clone)]
pub struct HttpPutTransport {
    client: reqwest::Client,
}

impl HttpPutTransport {
    /// Build a transport with its own client.
    pub fn new() -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("lightbox/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UploadError::other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Use an existing client (shared connection pool, custom TLS).
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Wrap the reader so progress advances as the connection consumes chunks.
fn counting_body(body: ByteReader, on_progress: ProgressSink) -> reqwest::Body {
    let mut acknowledged = 0u64;
    let mut in_flight = 0u64;

    let stream = ReaderStream::new(body).map(move |chunk| {
        if in_flight > 0 {
            acknowledged += in_flight;
            on_progress(acknowledged);
        }
        in_flight = chunk.as_ref().map_or(0, |bytes| bytes.len() as u64);
        chunk
    });

    reqwest::Body::wrap_stream(stream)
}

#[async_trait]
impl UploadTransportPort for HttpPutTransport {
    async fn put(
        &self,
        request: TransferRequest<'_>,
        body: ByteReader,
        on_progress: ProgressSink,
    ) -> Result<(), UploadError> {
        let response = self
            .client
            .put(&request.target.upload_url)
            .header(CONTENT_TYPE, request.content_type)
            .header(CONTENT_LENGTH, request.content_length)
            .body(counting_body(body, on_progress.clone()))
            .send()
            .await
            .map_err(|e| UploadError::transport(format!("Network error: {e}")))?;

        let status = response.status();
        if status.is_success() {
            on_progress(request.content_length);
            Ok(())
        } else {
            tracing::debug!(
                target: LOG_TARGET,
                id = %request.id,
                status = status.as_u16(),
                "Upload rejected by storage"
            );
            Err(UploadError::transport_with_status(
                format!("Upload failed with HTTP {status}"),
                status.as_u16(),
            ))
        }
    }
}
