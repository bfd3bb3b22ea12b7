//! Storage module for the response cache
//!
//! This module persists fetched responses so repeated runs can skip the network:
//! - `ResponseCache`: the pluggable cache interface used by the fetcher
//! - `SqliteCache`: durable SQLite implementation keyed by sha256(url)

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{cache_key, SqliteCache};
pub use traits::{CacheError, CacheResult, CacheStats, CachedResponse, ResponseCache};

use crate::config::CacheConfig;
use std::sync::Arc;

/// Opens the cache described by `config`, or `None` when caching is disabled
pub fn open_cache(config: &CacheConfig) -> CacheResult<Option<Arc<dyn ResponseCache>>> {
    if !config.enabled {
        return Ok(None);
    }
    let cache = SqliteCache::open(&config.path, config.ttl)?;
    tracing::info!("Response cache enabled at {}", config.path.display());
    Ok(Some(Arc::new(cache)))
}
