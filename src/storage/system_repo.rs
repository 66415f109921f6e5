use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{QueueError, Result};

use super::DbPool;

pub const KEY_DB_VERSION: &str = "db_version";
pub const KEY_LAST_REFRESH: &str = "last_refresh_ts";
pub const KEY_LAST_ROTATE: &str = "last_rotate_ts";
pub const KEY_LAST_FLUSH: &str = "last_flush_ts";

pub const SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone, Default)]
struct Cached {
    db_version: String,
    last_refresh_ts: i64,
    last_rotate_ts: i64,
    last_flush_ts: i64,
}

/// Engine bookkeeping: a small key/value table caching the maintenance
/// timestamps that throttle refresh and flush sweeps.
///
/// Values are loaded lazily on first access and written back only when they
/// actually change. Clones share the cache.
#[derive(Debug, Clone)]
pub struct SystemRepository {
    pool: DbPool,
    cache: Arc<Mutex<Option<Cached>>>,
}

impl SystemRepository {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool, cache: Arc::new(Mutex::new(None)) }
    }

    /// # Errors
    /// Returns `QueueError::Database` if the initial load fails.
    pub async fn db_version(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;
        let state = self.loaded(&mut cache).await?;
        Ok(state.db_version.clone())
    }

    /// # Errors
    /// Returns `QueueError::Database` if the initial load fails.
    pub async fn last_refresh(&self) -> Result<i64> {
        let mut cache = self.cache.lock().await;
        let state = self.loaded(&mut cache).await?;
        Ok(state.last_refresh_ts)
    }

    /// # Errors
    /// Returns `QueueError::Database` if the initial load fails.
    pub async fn last_rotation(&self) -> Result<i64> {
        let mut cache = self.cache.lock().await;
        let state = self.loaded(&mut cache).await?;
        Ok(state.last_rotate_ts)
    }

    /// # Errors
    /// Returns `QueueError::Database` if the initial load fails.
    pub async fn last_flush(&self) -> Result<i64> {
        let mut cache = self.cache.lock().await;
        let state = self.loaded(&mut cache).await?;
        Ok(state.last_flush_ts)
    }

    /// # Errors
    /// Returns `QueueError::Database` if the write fails.
    pub async fn set_last_refresh(&self, timestamp: i64) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let state = self.loaded(&mut cache).await?;
        if state.last_refresh_ts != timestamp {
            self.write(KEY_LAST_REFRESH, timestamp).await?;
            state.last_refresh_ts = timestamp;
        }
        Ok(())
    }

    /// # Errors
    /// Returns `QueueError::Database` if the write fails.
    pub async fn set_last_rotation(&self, timestamp: i64) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let state = self.loaded(&mut cache).await?;
        if state.last_rotate_ts != timestamp {
            self.write(KEY_LAST_ROTATE, timestamp).await?;
            state.last_rotate_ts = timestamp;
        }
        Ok(())
    }

    /// # Errors
    /// Returns `QueueError::Database` if the write fails.
    pub async fn set_last_flush(&self, timestamp: i64) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let state = self.loaded(&mut cache).await?;
        if state.last_flush_ts != timestamp {
            self.write(KEY_LAST_FLUSH, timestamp).await?;
            state.last_flush_ts = timestamp;
        }
        Ok(())
    }

    async fn loaded<'a>(&self, cache: &'a mut Option<Cached>) -> Result<&'a mut Cached> {
        if cache.is_none() {
            let rows = sqlx::query_as::<_, (String, String)>("SELECT ref, value FROM system")
                .fetch_all(&self.pool)
                .await?;

            let mut state = Cached::default();
            for (key, value) in rows {
                match key.as_str() {
                    KEY_DB_VERSION => state.db_version = value,
                    KEY_LAST_REFRESH => state.last_refresh_ts = value.parse().unwrap_or(0),
                    KEY_LAST_ROTATE => state.last_rotate_ts = value.parse().unwrap_or(0),
                    KEY_LAST_FLUSH => state.last_flush_ts = value.parse().unwrap_or(0),
                    _ => {}
                }
            }
            *cache = Some(state);
        }

        cache.as_mut().ok_or_else(|| QueueError::Inconsistent("system registry cache".into()))
    }

    async fn write(&self, key: &str, timestamp: i64) -> Result<()> {
        let result = sqlx::query("UPDATE system SET value = ? WHERE ref = ?")
            .bind(timestamp.to_string())
            .bind(key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::Inconsistent(format!("system registry key {key} is missing")));
        }

        Ok(())
    }
}
