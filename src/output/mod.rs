//! Output module for persisting extracted records and reporting crawl statistics
//!
//! This module handles:
//! - Batched record sinks (JSON Lines on disk, or in memory)
//! - Consolidating written batches into a single de-duplicated output file
//! - Crawl statistics snapshots and their printed summary

mod jsonl;
mod memory;
pub mod stats;
mod traits;

pub use jsonl::JsonlSink;
pub use memory::MemorySink;
pub use stats::{print_statistics, CrawlStats};
pub use traits::{Sink, SinkError, SinkResult};
