//! Transfer executor.
//!
//! Runs one admitted task's byte transfer, isolated from the queue's locks.
//! The executor operates on a value-type `TransferJob` and a transport
//! reference; it writes progress only to a `watch::Sender` and never touches
//! the registry. The queue facade applies the outcome afterwards.
//!
//! Cancellation is handled with `tokio::select!` around the whole
//! open-and-send sequence, so an abort drops the in-flight transport future.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use lightbox_core::{
    ProgressSink, TransferRequest, UploadError, UploadId, UploadSource, UploadTransportPort,
    WriteTarget,
};

use crate::LOG_TARGET;
use crate::registry::UploadTask;

/// Everything needed to run one attempt, with no references back to the queue.
pub struct TransferJob {
    /// Task id.
    pub id: UploadId,
    /// Zero-based attempt number.
    pub attempt: u32,
    /// Exact body length.
    pub file_size: u64,
    /// Sent as `Content-Type`.
    pub file_type: String,
    /// Destination.
    pub target: WriteTarget,
    /// Re-opened for every attempt.
    pub source: Arc<dyn UploadSource>,
    /// Child token of the queue's root token.
    pub cancel: CancellationToken,
    /// Integer percentage acknowledged so far.
    pub progress_tx: watch::Sender<u8>,
}

impl TransferJob {
    /// Build a job for an admitted task.
    pub fn for_task(
        task: &UploadTask,
        cancel: CancellationToken,
        progress_tx: watch::Sender<u8>,
    ) -> Self {
        Self {
            id: task.id,
            attempt: task.retry_count(),
            file_size: task.file_size,
            file_type: task.file_type.clone(),
            target: task.target.clone(),
            source: Arc::clone(&task.source),
            cancel,
            progress_tx,
        }
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The remote side accepted the whole body.
    Completed,
    /// The transfer or the source failed.
    Failed(UploadError),
    /// The job's token was cancelled before the transfer finished.
    Aborted,
}

/// What the registry should do with a finished attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Mark `completed`.
    Complete,
    /// Demote to `pending` for another attempt.
    Retry {
        /// Error from the failed attempt.
        error: String,
    },
    /// Mark `failed`.
    Fail {
        /// Error shown to the user.
        error: String,
    },
    /// Leave the task alone; an abort is neither progress nor a fault.
    Discard,
}

/// Decide the fate of an attempt.
///
/// `failures` is the number of failed attempts recorded before this one.
/// A failure is retried while the count including it stays below
/// `max_failures`; unrecoverable errors fail at once.
pub fn settle(outcome: &TransferOutcome, failures: u32, max_failures: u32) -> Settlement {
    match outcome {
        TransferOutcome::Completed => Settlement::Complete,
        TransferOutcome::Aborted => Settlement::Discard,
        TransferOutcome::Failed(err) => {
            let error = err.user_message();
            if err.is_recoverable() && failures.saturating_add(1) < max_failures {
                Settlement::Retry { error }
            } else {
                Settlement::Fail { error }
            }
        }
    }
}

/// Integer percentage of `total` covered by `sent`, clamped to 0-100.
///
/// An empty file reports 0 until it completes.
pub fn percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = u128::from(sent.min(total)) * 100 / u128::from(total);
    u8::try_from(pct).unwrap_or(100)
}

/// Build the transport's progress callback.
///
/// Only increases are published, so receivers observe a non-decreasing
/// sequence for the attempt.
fn progress_sink(total: u64, tx: watch::Sender<u8>) -> ProgressSink {
    Arc::new(move |sent| {
        let pct = percent(sent, total);
        tx.send_if_modified(|current| {
            if pct > *current {
                *current = pct;
                true
            } else {
                false
            }
        });
    })
}

/// Run one attempt to completion or abort.
pub async fn run_job(job: TransferJob, transport: &dyn UploadTransportPort) -> TransferOutcome {
    let TransferJob {
        id,
        attempt,
        file_size,
        file_type,
        target,
        source,
        cancel,
        progress_tx,
    } = job;

    tracing::debug!(target: LOG_TARGET, id = %id, attempt, "Transfer starting");

    let on_progress = progress_sink(file_size, progress_tx);
    let request = TransferRequest {
        id,
        target: &target,
        content_type: &file_type,
        content_length: file_size,
    };
    let work = send(source.as_ref(), request, transport, on_progress);

    tokio::select! {
        biased;

        () = cancel.cancelled() => TransferOutcome::Aborted,

        result = work => match result {
            Ok(()) => TransferOutcome::Completed,
            Err(_) if cancel.is_cancelled() => TransferOutcome::Aborted,
            Err(err) => TransferOutcome::Failed(err),
        },
    }
}

/// Open the source from byte 0 and hand it to the transport.
async fn send(
    source: &dyn UploadSource,
    request: TransferRequest<'_>,
    transport: &dyn UploadTransportPort,
    on_progress: ProgressSink,
) -> Result<(), UploadError> {
    let body = source.open().await?;
    transport.put(request, body, on_progress).await
}

/// Wait before an automatic retry while keeping the task's slot.
///
/// Returns `false` if `cancel` fired first.
pub async fn backoff(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
