//! HTTP fetcher implementation
//!
//! This module performs one logical fetch per request:
//! 1. Check robots.txt; a disallowed URL gets status 403 without any network call
//! 2. Look up the response cache; a hit skips the rate limiter
//! 3. Acquire a token for the URL's domain and retrieve the page
//! 4. Retry timeouts and transport errors with exponential backoff,
//!    re-acquiring a token before each attempt
//! 5. Store 200 responses in the cache
//!
//! Ordinary network and HTTP failures never surface as errors: they become a
//! `CrawlResponse` with status 0 and the last error message.

use crate::crawler::backend::{BackendError, FetchBackend, RawResponse};
use crate::crawler::rate_limiter::RateLimiter;
use crate::robots::RobotsCache;
use crate::state::{CrawlRequest, CrawlResponse};
use crate::storage::{CachedResponse, ResponseCache};
use crate::url::domain_of;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Error message of responses blocked by robots.txt
pub const ROBOTS_DENIED: &str = "Blocked by robots.txt";

/// Fetches requests through robots, cache, rate limiter and backend
pub struct Fetcher {
    backend: Arc<dyn FetchBackend>,
    rate_limiter: RateLimiter,
    robots: RobotsCache,
    cache: Option<Arc<dyn ResponseCache>>,
    max_retries: u32,
    retry_base_delay: Duration,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Fetcher {
    pub fn new(backend: Arc<dyn FetchBackend>, rate_limiter: RateLimiter, robots: RobotsCache) -> Self {
        Self {
            backend,
            rate_limiter,
            robots,
            cache: None,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            shutdown: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<Arc<dyn ResponseCache>>) -> Self {
        self.cache = cache;
        self
    }

    /// Additional attempts after a retryable error, and the backoff base
    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    /// Stops retrying once the receiver reads `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn set_backend(&mut self, backend: Arc<dyn FetchBackend>) {
        self.backend = backend;
    }

    pub fn set_cache(&mut self, cache: Option<Arc<dyn ResponseCache>>) {
        self.cache = cache;
    }

    pub fn set_shutdown(&mut self, shutdown: watch::Receiver<bool>) {
        self.shutdown = Some(shutdown);
    }

    pub fn robots(&self) -> &RobotsCache {
        &self.robots
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Sleeps for `delay`, returning early if shutdown is signalled
    async fn backoff(&self, delay: Duration) {
        match &self.shutdown {
            Some(rx) => {
                let mut rx = rx.clone();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = rx.wait_for(|stop| *stop) => {}
                }
            }
            None => tokio::time::sleep(delay).await,
        }
    }

    /// Fetches `request`, never failing for network or HTTP errors
    pub async fn fetch(&self, request: CrawlRequest) -> CrawlResponse {
        // Robots first, so a new disallow rule wins over cached content
        if !self.robots.can_fetch(&request.url).await {
            return CrawlResponse::rejected(request, 403, ROBOTS_DENIED);
        }

        if let Some(response) = self.cached(&request).await {
            tracing::debug!("Cache hit: {}", request.url);
            return response;
        }

        let Some(domain) = domain_of(&request.url) else {
            return CrawlResponse::failed(request.clone(), format!("Invalid URL: {}", request.url));
        };

        let headers = request.extra_headers();
        let mut last_error = BackendError::Transport("No attempt made".to_string());

        for attempt in 0..=self.max_retries {
            if attempt > 0 && self.is_shutdown() {
                tracing::debug!("Shutdown requested, not retrying {}", request.url);
                break;
            }

            self.rate_limiter.acquire(&domain).await;

            match self.backend.retrieve(&request.url, &headers).await {
                Ok(raw) => return self.complete(request, raw).await,
                Err(e) => {
                    tracing::debug!(
                        "Fetch attempt {}/{} failed for {}: {}",
                        attempt + 1,
                        self.max_retries + 1,
                        request.url,
                        e
                    );
                    last_error = e;
                }
            }

            if attempt < self.max_retries {
                let delay = self.retry_base_delay.saturating_mul(2u32.saturating_pow(attempt));
                self.backoff(delay).await;
            }
        }

        tracing::warn!("Giving up on {}: {}", request.url, last_error);
        CrawlResponse::failed(request, last_error.to_string())
    }

    async fn cached(&self, request: &CrawlRequest) -> Option<CrawlResponse> {
        let cache = self.cache.as_ref()?;
        match cache.get(&request.url).await {
            Ok(Some(entry)) => Some(CrawlResponse {
                url: entry.url,
                status: entry.status,
                content: entry.content,
                headers: entry.headers,
                fetched_at: Utc::now(),
                error: None,
                from_cache: true,
                request: request.clone(),
            }),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Cache lookup failed for {}: {}", request.url, e);
                None
            }
        }
    }

    async fn complete(&self, request: CrawlRequest, raw: RawResponse) -> CrawlResponse {
        let content = if raw.status == 200 { raw.body } else { String::new() };
        let response = CrawlResponse {
            url: raw.url,
            status: raw.status,
            content,
            headers: raw.headers,
            fetched_at: Utc::now(),
            error: None,
            from_cache: false,
            request,
        };

        if response.status == 200 {
            if let Some(cache) = &self.cache {
                let entry = CachedResponse {
                    url: response.url.clone(),
                    status: response.status,
                    content: response.content.clone(),
                    headers: response.headers.clone(),
                    cached_at: response.fetched_at,
                };
                if let Err(e) = cache.set(&response.request.url, entry).await {
                    tracing::warn!("Failed to cache {}: {}", response.url, e);
                }
            }
        }

        response
    }
}
