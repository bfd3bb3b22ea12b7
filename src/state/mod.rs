//! State module for the crawl data model
//!
//! # Components
//!
//! - `CrawlRequest` / `CrawlResponse`: a URL to fetch and the result of fetching it
//! - `PageItem`: the record produced by the built-in extractors
//! - `DomainBucket`: per-domain token bucket used by the rate limiter
//! - `CrawlState`: crawl-wide counters, page budget and lifecycle phase

mod crawl_state;
mod domain_state;
mod item;
mod request;
mod response;

// Re-export main types
pub use crawl_state::{CrawlPhase, CrawlState, SlotClaim};
pub use domain_state::DomainBucket;
pub use item::PageItem;
pub use request::{CrawlRequest, HEADERS_KEY};
pub use response::CrawlResponse;
