//! Per-domain rate limiting
//!
//! Each domain gets its own token bucket, created lazily on first use. The
//! bucket lock only covers the refill-and-take step; callers sleep outside it,
//! so concurrent callers for one domain never wait on each other's sleep.

use crate::config::CrawlerConfig;
use crate::state::DomainBucket;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::Instant;

/// Per-domain token bucket rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    default_rate: f64,
    burst: Option<f64>,
    overrides: HashMap<String, f64>,
    buckets: Mutex<HashMap<String, Arc<Mutex<DomainBucket>>>>,
}

impl RateLimiter {
    /// Creates a limiter with `rate` tokens/sec per domain and `burst` capacity
    /// (defaults to the domain's rate)
    pub fn new(rate: f64, burst: Option<f64>) -> Self {
        Self {
            default_rate: rate,
            burst,
            overrides: HashMap::new(),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(config.rate_limit, config.burst)
            .with_domain_rates(config.domain_rate_limits.clone())
    }

    /// Per-domain rate overrides, keyed by lowercase domain
    pub fn with_domain_rates(mut self, rates: HashMap<String, f64>) -> Self {
        self.overrides = rates
            .into_iter()
            .map(|(domain, rate)| (domain.to_lowercase(), rate))
            .collect();
        self
    }

    /// Rate applied to `domain`
    pub fn rate_for(&self, domain: &str) -> f64 {
        self.overrides
            .get(domain)
            .copied()
            .unwrap_or(self.default_rate)
    }

    fn bucket(&self, domain: &str) -> Arc<Mutex<DomainBucket>> {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        buckets
            .entry(domain.to_string())
            .or_insert_with(|| {
                let rate = self.rate_for(domain);
                let capacity = self.burst.unwrap_or(rate).max(1.0);
                tracing::trace!("Creating bucket for {} ({} req/s, burst {})", domain, rate, capacity);
                Arc::new(Mutex::new(DomainBucket::new(rate, capacity)))
            })
            .clone()
    }

    /// Waits until a token for `domain` is available and consumes it
    pub async fn acquire(&self, domain: &str) {
        let bucket = self.bucket(domain);
        loop {
            let attempt = bucket
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .try_take(Instant::now());

            match attempt {
                Ok(()) => return,
                Err(wait) => {
                    tracing::trace!("Rate limited on {}, waiting {:?}", domain, wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Number of domains with a bucket
    pub fn domain_count(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
