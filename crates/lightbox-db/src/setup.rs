//! Database setup and initialization.
//!
//! Entry points call `setup_store()` with the resolved database path and
//! hand the returned store to the upload queue.

use std::path::Path;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::SqliteKvStore;

/// Open (or create) the database at `db_path` and ensure the schema exists.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created, the
/// database cannot be opened, or schema creation fails.
///
/// # Example
///
/// ```rust,no_run
/// use lightbox_db::setup_store;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let store = setup_store(Path::new("/path/to/lightbox.db")).await?;
/// # Ok(())
/// # }
/// ```
pub async fn setup_store(db_path: &Path) -> Result<SqliteKvStore> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .create_if_missing(true),
        )
        .await?;

    let store = SqliteKvStore::new(pool);
    store.ensure_table().await?;

    tracing::debug!(path = %db_path.display(), "Opened lightbox store");
    Ok(store)
}

/// In-memory store with the production schema, for tests.
#[cfg(any(test, feature = "test-utils"))]
pub async fn setup_test_store() -> Result<SqliteKvStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let store = SqliteKvStore::new(pool);
    store.ensure_table().await?;
    Ok(store)
}
