//! Key-value store port definition.
//!
//! The persistence adapter writes one serialized snapshot under a fixed key.
//! Anything offering `get` / `set` / `delete` on byte values can back it:
//! an in-memory map in tests, `SQLite` for a desktop host.

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage backend error (database, filesystem, quota).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Byte-oriented durable key-value store.
#[async_trait]
pub trait KeyValueStorePort: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
