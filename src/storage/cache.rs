use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

use super::{CacheError, CacheRecord, CacheStore};
use crate::blogroll::AggregatedList;

/// Namespace of every aggregated-list key.
pub const CACHE_KEY_PREFIX: &str = "blogroll:list";

/// Cache key of one blogroll instance.
///
/// Keys are namespaced per instance so independently configured blogrolls
/// sharing a store never collide.
pub fn cache_key(instance_id: &str) -> String {
    format!("{CACHE_KEY_PREFIX}:{instance_id}")
}

/// TTL-bounded cache of aggregated lists.
pub struct CacheManager<S> {
    store: S,
}

impl<S: CacheStore> CacheManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the cached list for `key` unless it is absent or expired.
    ///
    /// Expired records are left in place; the next [`set`](Self::set)
    /// overwrites them.
    pub async fn get(&self, key: &str) -> Result<Option<AggregatedList>, CacheError> {
        let Some(record) = self.store.load(key).await? else {
            return Ok(None);
        };

        if record.is_expired(Utc::now()) {
            tracing::debug!(key = %key, expired_at = %record.expires_at, "Cached blogroll expired");
            return Ok(None);
        }

        serde_json::from_str(&record.value)
            .map(Some)
            .map_err(CacheError::Decode)
    }

    /// Stores `list` under `key` until `now + ttl`, replacing any prior record.
    pub async fn set(
        &self,
        key: &str,
        list: &AggregatedList,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let value = serde_json::to_string(list).map_err(CacheError::Encode)?;
        let record = CacheRecord {
            key: key.to_string(),
            value,
            expires_at: expires_after(Utc::now(), ttl),
        };
        self.store.store(record).await
    }

    /// Removes the record for `key` regardless of its TTL.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        if self.store.remove(key).await? {
            tracing::debug!(key = %key, "Cached blogroll removed");
        }
        Ok(())
    }

    /// Removes the list of `instance_id` and returns the feed URLs it held.
    ///
    /// The caller is expected to re-fetch those feeds with a zero-age cache
    /// policy. Only a live record yields URLs: an expired or undecodable one
    /// is removed all the same, with nothing to cascade to.
    pub async fn invalidate_cascade(&self, instance_id: &str) -> Result<Vec<String>, CacheError> {
        let key = cache_key(instance_id);

        let feed_urls = match self.get(&key).await {
            Ok(Some(list)) => list.feed_urls(),
            Ok(None) => Vec::new(),
            Err(CacheError::Decode(e)) => {
                tracing::warn!(key = %key, error = %e, "Cached blogroll unreadable, nothing to cascade");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        self.invalidate(&key).await?;
        Ok(feed_urls)
    }

    /// Drops every expired record from the store. Called explicitly, e.g. at startup.
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        self.store.purge_expired(Utc::now()).await
    }
}

fn expires_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
