//! Ergane: a polite, bounded web crawling engine
//!
//! This crate crawls outward from a set of seed URLs with a fixed-size worker pool,
//! respecting per-domain rate limits and robots.txt, de-duplicating URLs with bounded
//! memory, and streaming extracted records to a sink while keeping a global page budget.

pub mod auth;
pub mod config;
pub mod crawler;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Ergane operations
#[derive(Debug, Error)]
pub enum ErganeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Response cache error: {0}")]
    Cache(#[from] storage::CacheError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] crawler::CheckpointError),

    #[error("Authentication failed: {0}")]
    Auth(#[from] auth::AuthError),

    #[error("Output error: {0}")]
    Sink(#[from] output::SinkError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crawl task failed: {0}")]
    Task(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Ergane operations
pub type Result<T> = std::result::Result<T, ErganeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{
    CrawlHandle, CrawlOutcome, CrawlReport, Crawler, Extractor, HtmlExtractor, ShutdownHandle,
};
pub use output::{CrawlStats, Sink};
pub use state::{CrawlRequest, CrawlResponse, PageItem};
pub use url::{extract_domain, normalize_url};
