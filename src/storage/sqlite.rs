//! SQLite response cache
//!
//! This module provides a durable, SQLite-based implementation of the
//! `ResponseCache` trait. Blocking database calls run on tokio's blocking pool.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    CacheError, CacheResult, CacheStats, CachedResponse, ResponseCache,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Hex-encoded SHA-256 of a URL, used as the cache key
pub fn cache_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// SQLite response cache backend
#[derive(Debug, Clone)]
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
    ttl: Duration,
}

impl SqliteCache {
    /// Opens (or creates) the cache database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file; parent directories are created
    /// * `ttl_secs` - Maximum age of entries returned by `get`
    pub fn open(path: &Path, ttl_secs: u64) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL lets readers proceed while a fetch writes
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn, ttl_secs))
    }

    /// Creates an in-memory cache (for testing)
    pub fn open_in_memory(ttl_secs: u64) -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn, ttl_secs))
    }

    fn from_connection(conn: Connection, ttl_secs: u64) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl: Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX).min(i64::MAX / 1000)),
        }
    }

    fn cutoff(&self) -> i64 {
        Utc::now()
            .checked_sub_signed(self.ttl)
            .map_or(i64::MIN, |t| t.timestamp_millis())
    }

    async fn with_conn<T, F>(&self, f: F) -> CacheResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> CacheResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn)
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
    }
}

#[async_trait]
impl ResponseCache for SqliteCache {
    async fn get(&self, url: &str) -> CacheResult<Option<CachedResponse>> {
        let key = cache_key(url);
        let cutoff = self.cutoff();

        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT url, status_code, content, headers, cached_at
                     FROM responses WHERE url_hash = ?1",
                    params![key],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, u16>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, i64>(4)?,
                        ))
                    },
                )
                .optional()?;

            let Some((url, status, content, headers, cached_at)) = row else {
                return Ok(None);
            };

            if cached_at < cutoff {
                conn.execute("DELETE FROM responses WHERE url_hash = ?1", params![key])?;
                return Ok(None);
            }

            Ok(Some(CachedResponse {
                url,
                status,
                content,
                headers: serde_json::from_str(&headers)?,
                cached_at: DateTime::from_timestamp_millis(cached_at).unwrap_or_else(Utc::now),
            }))
        })
        .await
    }

    async fn set(&self, url: &str, response: CachedResponse) -> CacheResult<()> {
        let key = cache_key(url);
        let headers = serde_json::to_string(&response.headers)?;

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO responses
                 (url_hash, url, status_code, content, headers, cached_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    key,
                    response.url,
                    response.status,
                    response.content,
                    headers,
                    response.cached_at.timestamp_millis()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, url: &str) -> CacheResult<bool> {
        let key = cache_key(url);
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM responses WHERE url_hash = ?1", params![key])?;
            Ok(removed > 0)
        })
        .await
    }

    async fn clear(&self) -> CacheResult<u64> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM responses", [])? as u64))
            .await
    }

    async fn cleanup_expired(&self) -> CacheResult<u64> {
        let cutoff = self.cutoff();
        let removed = self
            .with_conn(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM responses WHERE cached_at < ?1",
                    params![cutoff],
                )? as u64)
            })
            .await?;

        if removed > 0 {
            tracing::debug!("Removed {} expired cache entries", removed);
        }
        Ok(removed)
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        self.with_conn(|conn| {
            let entries: i64 =
                conn.query_row("SELECT COUNT(*) FROM responses", [], |row| row.get(0))?;
            let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
            let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;

            Ok(CacheStats {
                entries: entries.max(0) as u64,
                size_bytes: (page_count * page_size).max(0) as u64,
            })
        })
        .await
    }
}
