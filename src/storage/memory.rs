use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use super::{CacheError, CacheRecord, CacheStore};

/// Process-local [`CacheStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, CacheRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        let records = self.records.read().map_err(|_| CacheError::Poisoned)?;
        Ok(records.get(key).cloned())
    }

    async fn store(&self, record: CacheRecord) -> Result<(), CacheError> {
        let mut records = self.records.write().map_err(|_| CacheError::Poisoned)?;
        records.insert(record.key.clone(), record);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let mut records = self.records.write().map_err(|_| CacheError::Poisoned)?;
        Ok(records.remove(key).is_some())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CacheError> {
        let mut records = self.records.write().map_err(|_| CacheError::Poisoned)?;
        let before = records.len();
        records.retain(|_, record| !record.is_expired(now));
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(key: &str, value: &str, expires_at: DateTime<Utc>) -> CacheRecord {
        CacheRecord {
            key: key.to_string(),
            value: value.to_string(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_store_replaces_whole_record() {
        let store = MemoryStore::new();
        let later = Utc::now() + Duration::hours(1);
        let much_later = Utc::now() + Duration::hours(2);

        store.store(record("k", "old", later)).await.unwrap();
        store.store(record("k", "new", much_later)).await.unwrap();

        let loaded = store.load("k").await.unwrap().unwrap();
        assert_eq!(loaded, record("k", "new", much_later));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_reports_presence() {
        let store = MemoryStore::new();
        store
            .store(record("k", "v", Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        assert!(store.remove("k").await.unwrap());
        assert!(!store.remove("k").await.unwrap());
        assert!(store.load("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_live_records() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .store(record("live", "v", now + Duration::hours(1)))
            .await
            .unwrap();
        store
            .store(record("dead", "v", now - Duration::seconds(1)))
            .await
            .unwrap();

        assert_eq!(store.purge_expired(now).await.unwrap(), 1);
        assert!(store.load("live").await.unwrap().is_some());
        assert!(store.load("dead").await.unwrap().is_none());
    }
}
