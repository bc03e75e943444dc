use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::{CacheError, CacheRecord, CacheStore};

/// SQLite-backed [`CacheStore`].
///
/// One row per cache key; `expires_at` is stored as Unix milliseconds.
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the cache database and run migrations.
    ///
    /// `path` may be `":memory:"` for a throwaway database.
    pub async fn open(path: &str) -> Result<Self, CacheError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // SEC-010: Pre-create the database file user-only before the pool opens it
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::OpenOptionsExt;
            let db_path = std::path::Path::new(path);
            if !db_path.exists() && db_path.parent().is_some_and(|p| p.exists()) {
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok(); // If creation fails, SQLite will report the error at connect_with.
            }
        }

        // busy_timeout=5000: concurrent CLI runs wait for the writer instead of failing
        let options = SqliteConnectOptions::from_str(&url)?.pragma("busy_timeout", "5000");
        // Every in-memory connection is its own database
        let max_connections = if path == ":memory:" { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store
            .migrate()
            .await
            .map_err(|e| CacheError::Migration(e.to_string()))?;
        Ok(store)
    }

    /// Idempotent schema setup; every statement uses `IF NOT EXISTS`.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS list_cache (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_list_cache_expires ON list_cache(expires_at)")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

impl CacheStore for SqliteStore {
    async fn load(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        let row: Option<(String, String, i64)> =
            sqlx::query_as("SELECT key, value, expires_at FROM list_cache WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(key, value, expires_at)| CacheRecord {
            key,
            value,
            // Out-of-range timestamps read as already expired
            expires_at: DateTime::from_timestamp_millis(expires_at)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        }))
    }

    async fn store(&self, record: CacheRecord) -> Result<(), CacheError> {
        sqlx::query("INSERT OR REPLACE INTO list_cache (key, value, expires_at) VALUES (?, ?, ?)")
            .bind(&record.key)
            .bind(&record.value)
            .bind(record.expires_at.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let result = sqlx::query("DELETE FROM list_cache WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM list_cache WHERE expires_at <= ?")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
