//! `SQLite` persistence for lightbox.
//!
//! Provides a `KeyValueStorePort` backed by a single `kv_store` table, so the
//! upload queue snapshot survives process restarts on desktop hosts.

#![deny(unsafe_code)]

pub mod kv_store;
pub mod setup;

pub use kv_store::SqliteKvStore;

pub use setup::setup_store;
#[cfg(any(test, feature = "test-utils"))]
pub use setup::setup_test_store;
