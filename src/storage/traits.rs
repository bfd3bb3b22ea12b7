//! Response cache traits and error types
//!
//! This module defines the trait interface for response cache backends and
//! associated error types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache task failed: {0}")]
    Task(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// A stored response
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    /// Final URL the response was served from
    pub url: String,
    pub status: u16,
    pub content: String,
    pub headers: HashMap<String, String>,
    pub cached_at: DateTime<Utc>,
}

/// Size of the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: u64,
    pub size_bytes: u64,
}

/// Trait for response cache implementations
///
/// Entries are keyed by a deterministic hash of the request URL. Implementations
/// must be safe to share between concurrent fetches.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Returns the entry for `url` if present and younger than the TTL
    ///
    /// Expired entries are removed as a side effect.
    async fn get(&self, url: &str) -> CacheResult<Option<CachedResponse>>;

    /// Inserts or replaces the entry for `url`
    async fn set(&self, url: &str, response: CachedResponse) -> CacheResult<()>;

    /// Removes the entry for `url`, returning whether one existed
    async fn delete(&self, url: &str) -> CacheResult<bool>;

    /// Removes every entry, returning how many were removed
    async fn clear(&self) -> CacheResult<u64>;

    /// Removes every expired entry, returning how many were removed
    async fn cleanup_expired(&self) -> CacheResult<u64>;

    async fn stats(&self) -> CacheResult<CacheStats>;
}
