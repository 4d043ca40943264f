//! Revalidation store module.
//!
//! Keeps the last validator and body per resource key so the fetch cache can
//! issue conditional requests. Two interchangeable backends are provided.

mod memory;
mod models;
mod sqlite;

pub use memory::*;
pub use models::*;
pub use sqlite::*;

use thiserror::Error;

/// Store error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("corrupt entry for {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Keyed storage of cache validators.
///
/// Reads and writes for a single key are linearizable in every implementation.
pub trait RevalidationStore: Send + Sync {
    /// Get the entry stored for `key`, if any.
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Store `entry` under `key`, replacing whatever was there.
    fn put(&self, key: &str, entry: CacheEntry) -> Result<(), StoreError>;

    /// Store `entry` only if it supersedes the current one.
    ///
    /// Returns `true` when the entry was written. See [`CacheEntry::supersedes`].
    fn put_if_newer(&self, key: &str, entry: CacheEntry) -> Result<bool, StoreError>;

    /// Remove the entry for `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// All keys currently stored, sorted.
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}
