//! Cache storage for aggregated blogrolls.
//!
//! [`CacheManager`] is the only component that reads or writes cached lists.
//! It sits on a [`CacheStore`], of which two exist:
//!
//! - [`MemoryStore`] - process-local map, for embedding and tests
//! - [`SqliteStore`] - SQLite file, so the CLI keeps its cache between runs
//!
//! Expiry is checked when a record is read; nothing sweeps in the background.

mod cache;
mod memory;
mod sqlite;

use chrono::{DateTime, Utc};
use std::future::Future;
use thiserror::Error;

pub use cache::{cache_key, CacheManager, CACHE_KEY_PREFIX};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors raised by the cache layer.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to encode blogroll for the cache: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode cached blogroll: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Cache database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache migration failed: {0}")]
    Migration(String),

    #[error("Cache store lock poisoned")]
    Poisoned,
}

/// One cached value with its absolute expiry.
///
/// Stores replace records as a whole, so a reader never sees a value paired
/// with another write's expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub key: String,
    /// Serialized [`AggregatedList`](crate::AggregatedList), opaque to stores.
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl CacheRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Key/record storage behind the [`CacheManager`].
pub trait CacheStore: Send + Sync {
    /// Returns the record for `key`, expired or not.
    fn load(&self, key: &str)
        -> impl Future<Output = Result<Option<CacheRecord>, CacheError>> + Send;

    /// Inserts or replaces the record for `record.key`.
    fn store(&self, record: CacheRecord) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Removes the record for `key`. Returns whether one existed.
    fn remove(&self, key: &str) -> impl Future<Output = Result<bool, CacheError>> + Send;

    /// Deletes every record that expired at or before `now`.
    ///
    /// Returns the number of records removed.
    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, CacheError>> + Send;
}
