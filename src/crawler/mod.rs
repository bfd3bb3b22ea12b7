//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with robots.txt checks, rate limiting, retries and caching
//! - HTML parsing, link extraction and record extraction
//! - The prioritized, de-duplicating frontier
//! - Request/response hooks
//! - Overall crawl coordination, checkpoints and shutdown

mod backend;
mod checkpoint;
mod coordinator;
mod extractor;
mod fetcher;
mod hooks;
mod parser;
mod rate_limiter;
mod scheduler;

pub use backend::{build_http_client, BackendError, FetchBackend, HttpBackend, HttpSession, RawResponse};
pub use checkpoint::{Checkpoint, CheckpointError, CheckpointResult};
pub use coordinator::{CrawlHandle, CrawlOutcome, CrawlReport, Crawler, ShutdownHandle};
pub use extractor::{ExtractError, Extraction, Extractor, HtmlExtractor, SelectorExtractor};
pub use fetcher::{Fetcher, ROBOTS_DENIED};
pub use hooks::{HeaderHook, Hook, HookAction, HookChain, LoggingHook, StatusFilterHook};
pub use parser::{extract_links, parse_html, ParsedPage};
pub use rate_limiter::RateLimiter;
pub use scheduler::{QueuedRequest, Scheduler, SchedulerState, DEFAULT_SEEN_CAPACITY};
