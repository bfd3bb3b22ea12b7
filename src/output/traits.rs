//! Sink trait and error types
//!
//! A sink persists extracted records in batches. The crawler never looks at
//! the serialized form; it only adds records, flushes, and asks the sink to
//! consolidate once the crawl has drained.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while persisting records
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write output: {0}")]
    Write(String),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Batched, format-agnostic record persistence
#[async_trait]
pub trait Sink<T>: Send + Sync
where
    T: Send + 'static,
{
    /// Buffers one record, writing a batch when the buffer is full
    async fn add(&self, item: T) -> SinkResult<()>;

    async fn add_many(&self, items: Vec<T>) -> SinkResult<()> {
        for item in items {
            self.add(item).await?;
        }
        Ok(())
    }

    /// Writes any buffered records
    async fn flush(&self) -> SinkResult<()>;

    /// Merges written batches into the final output
    async fn consolidate(&self) -> SinkResult<()> {
        Ok(())
    }

    /// Number of the next batch to be written, recorded in checkpoints
    fn batch_number(&self) -> u64 {
        0
    }

    /// Continues batch numbering after a resumed checkpoint
    fn resume_at_batch(&self, _batch: u64) {}
}
