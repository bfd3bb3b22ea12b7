use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Ergane
///
/// Every section is optional in the TOML file; missing sections and keys fall
/// back to the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub cache: CacheConfig,
    pub checkpoint: CheckpointConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// URLs the crawl starts from (depth 0)
    pub seeds: Vec<String>,

    /// Global page budget for one crawl run
    #[serde(rename = "max-pages")]
    pub max_pages: usize,

    /// Maximum link depth followed from the seeds
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Number of concurrent workers
    pub concurrency: usize,

    /// Requests per second allowed per domain
    #[serde(rename = "rate-limit")]
    pub rate_limit: f64,

    /// Token bucket capacity; defaults to the domain's rate
    pub burst: Option<f64>,

    /// Per-domain overrides of `rate-limit`
    #[serde(rename = "domain-rate-limits")]
    pub domain_rate_limits: HashMap<String, f64>,

    /// Per-attempt request timeout (seconds)
    pub timeout: f64,

    /// Additional attempts after a timeout or transport error
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Base of the exponential retry backoff (seconds)
    #[serde(rename = "retry-base-delay")]
    pub retry_base_delay: f64,

    /// Only follow links whose domain matches one of the seeds
    #[serde(rename = "same-domain")]
    pub same_domain: bool,

    #[serde(rename = "respect-robots-txt")]
    pub respect_robots_txt: bool,

    /// Maximum number of pending requests in the frontier
    #[serde(rename = "max-queue-size")]
    pub max_queue_size: usize,

    /// Maximum number of normalized URLs remembered for de-duplication
    #[serde(rename = "seen-capacity")]
    pub seen_capacity: usize,

    /// Maximum number of origins with cached robots.txt rules
    #[serde(rename = "robots-cache-capacity")]
    pub robots_cache_capacity: usize,

    /// Capacity of the live output channel
    #[serde(rename = "output-buffer")]
    pub output_buffer: usize,

    pub proxy: Option<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            max_pages: 100,
            max_depth: 3,
            concurrency: 10,
            rate_limit: 10.0,
            burst: None,
            domain_rate_limits: HashMap::new(),
            timeout: 30.0,
            max_retries: 3,
            retry_base_delay: 1.0,
            same_domain: true,
            respect_robots_txt: true,
            max_queue_size: 10_000,
            seen_capacity: crate::crawler::DEFAULT_SEEN_CAPACITY,
            robots_cache_capacity: crate::robots::DEFAULT_ROBOTS_CAPACITY,
            output_buffer: 1_024,
            proxy: None,
        }
    }
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_base_delay)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler, also the robots.txt product token
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: Option<String>,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: Option<String>,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "Ergane".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: None,
            contact_email: None,
        }
    }
}

impl UserAgentConfig {
    /// Formats the User-Agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        let contact: Vec<String> = [
            self.contact_url.as_ref().map(|u| format!("+{}", u)),
            self.contact_email.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();

        if contact.is_empty() {
            format!("{}/{}", self.crawler_name, self.crawler_version)
        } else {
            format!(
                "{}/{} ({})",
                self.crawler_name,
                self.crawler_version,
                contact.join("; ")
            )
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Path to the SQLite cache database
    pub path: PathBuf,

    /// Time-to-live of cached responses (seconds)
    pub ttl: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from(".ergane_cache/response_cache.db"),
            ttl: 3600,
        }
    }
}

/// Checkpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Save a checkpoint every N crawled pages (0 disables periodic saves)
    pub interval: usize,

    /// Checkpoint file; checkpointing is off when unset
    pub path: Option<PathBuf>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            interval: 100,
            path: None,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Consolidated JSONL output file
    pub path: PathBuf,

    /// Records buffered before a batch file is written
    #[serde(rename = "batch-size")]
    pub batch_size: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("output.jsonl"),
            batch_size: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_without_contact() {
        let ua = UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: None,
            contact_email: None,
        };
        assert_eq!(ua.header_value(), "TestCrawler/1.0");
    }

    #[test]
    fn test_user_agent_with_contact() {
        let ua = UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: Some("https://example.com/about".to_string()),
            contact_email: Some("admin@example.com".to_string()),
        };
        assert_eq!(
            ua.header_value(),
            "TestCrawler/1.0 (+https://example.com/about; admin@example.com)"
        );
    }

    #[test]
    fn test_durations() {
        let config = CrawlerConfig {
            timeout: 2.5,
            retry_base_delay: 0.25,
            ..Default::default()
        };
        assert_eq!(config.timeout(), Duration::from_millis(2500));
        assert_eq!(config.retry_base_delay(), Duration::from_millis(250));
    }
}
