//! CLI bootstrap - the composition root.
//!
//! The only place where concrete adapters are chosen: the `SQLite` store
//! (via lightbox-db), the HTTP transport and the channel emitter (via
//! lightbox-upload). Handlers receive the assembled `CliContext`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc::UnboundedReceiver;

use lightbox_db::setup_store;
use lightbox_upload::{
    ChannelEmitter, HttpPutTransport, UploadEvent, UploadQueue, UploadQueueConfig,
    UploadQueueDeps, build_upload_queue,
};

use crate::error::CliError;

const APP_DIR: &str = "lightbox";
const DB_FILE: &str = "lightbox.db";

/// Bootstrap configuration for the CLI.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// `SQLite` file holding the queue snapshot.
    pub db_path: PathBuf,
    /// Queue tuning.
    pub queue: UploadQueueConfig,
}

impl CliConfig {
    /// Config with the database in the platform data directory.
    pub fn with_defaults() -> Result<Self, CliError> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| CliError::Config("Could not determine a data directory".into()))?;
        Ok(Self {
            db_path: data_dir.join(APP_DIR).join(DB_FILE),
            queue: UploadQueueConfig::default(),
        })
    }

    /// Apply command-line overrides.
    #[must_use]
    pub fn with_overrides(mut self, db: Option<PathBuf>, concurrency: Option<u16>) -> Self {
        if let Some(db) = db {
            self.db_path = db;
        }
        if let Some(n) = concurrency {
            self.queue = self.queue.with_max_concurrent(usize::from(n));
        }
        self
    }
}

/// Fully composed context for CLI commands.
pub struct CliContext {
    /// The upload queue.
    pub queue: UploadQueue,
    /// Where the snapshot lives.
    pub db_path: PathBuf,
    events: Option<UnboundedReceiver<UploadEvent>>,
}

impl CliContext {
    /// Take the queue's event stream. Only the first caller gets it.
    pub const fn take_events(&mut self) -> Option<UnboundedReceiver<UploadEvent>> {
        self.events.take()
    }
}

/// Bootstrap the CLI application.
///
/// Opens the snapshot database, builds the HTTP transport and assembles the
/// upload queue around them.
pub async fn bootstrap(config: CliConfig) -> Result<CliContext> {
    let store = setup_store(&config.db_path)
        .await
        .map_err(|e| CliError::Database(format!("{e:#}")))?;
    let transport = HttpPutTransport::new().map_err(CliError::from)?;
    let (emitter, events) = ChannelEmitter::new();

    let queue = build_upload_queue(UploadQueueDeps {
        transport: Arc::new(transport),
        store: Arc::new(store),
        emitter: Arc::new(emitter),
        config: config.queue,
    });

    tracing::debug!(db = %config.db_path.display(), "CLI context ready");

    Ok(CliContext {
        queue,
        db_path: config.db_path,
        events: Some(events),
    })
}
