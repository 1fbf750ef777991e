//! Upload queue configuration.

use std::time::Duration;

/// Default ceiling on simultaneous transfers.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Default number of failed attempts after which a task is marked failed.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Fixed key the persisted snapshot is stored under.
pub const DEFAULT_STORAGE_KEY: &str = "lightbox_upload_queue";

/// Snapshots older than this are discarded on load.
pub const DEFAULT_SNAPSHOT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for an `UploadQueue`.
///
/// The defaults allow five concurrent transfers and three attempts per file
/// with no delay between them, and keep a snapshot resumable for 24 hours.
#[derive(Debug, Clone)]
pub struct UploadQueueConfig {
    /// Maximum concurrent transfers.
    pub max_concurrent: usize,
    /// Failed attempts per task before it is marked failed; every earlier
    /// failure is retried automatically.
    pub max_retries: u32,
    /// Key under which the persisted snapshot is stored.
    pub storage_key: String,
    /// Age past which a persisted snapshot is treated as absent.
    pub snapshot_max_age: Duration,
    /// Pause between a failed attempt and its automatic retry.
    ///
    /// Zero (the default) retries immediately.
    pub retry_delay: Duration,
}

impl Default for UploadQueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_retries: DEFAULT_MAX_RETRIES,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            snapshot_max_age: DEFAULT_SNAPSHOT_MAX_AGE,
            retry_delay: Duration::ZERO,
        }
    }
}

impl UploadQueueConfig {
    /// Set the maximum concurrent transfers (at least one).
    #[must_use]
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Set the failed-attempt budget.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the storage key.
    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Set the snapshot age limit.
    #[must_use]
    pub const fn with_snapshot_max_age(mut self, max_age: Duration) -> Self {
        self.snapshot_max_age = max_age;
        self
    }

    /// Set the delay before an automatic retry.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}
