use super::CrawlRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The outcome of one logical fetch (including its internal retries)
///
/// Network failures are represented with `status == 0` and `error` set;
/// robots.txt denials use status 403.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResponse {
    /// Final URL after redirects
    pub url: String,

    pub status: u16,

    /// Body text; empty unless the status is 200
    pub content: String,

    pub headers: HashMap<String, String>,

    pub fetched_at: DateTime<Utc>,

    pub error: Option<String>,

    pub from_cache: bool,

    /// The request that produced this response
    pub request: CrawlRequest,
}

impl CrawlResponse {
    /// Builds a failed response for `request` with status 0
    pub fn failed(request: CrawlRequest, error: impl Into<String>) -> Self {
        Self::rejected(request, 0, error)
    }

    /// Builds a response that never reached the network
    pub fn rejected(request: CrawlRequest, status: u16, error: impl Into<String>) -> Self {
        Self {
            url: request.url.clone(),
            status,
            content: String::new(),
            headers: HashMap::new(),
            fetched_at: Utc::now(),
            error: Some(error.into()),
            from_cache: false,
            request,
        }
    }

    /// Status 200 with no error
    pub fn is_success(&self) -> bool {
        self.status == 200 && self.error.is_none()
    }

    /// Counted in the crawl's error total
    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.status == 0 || self.status >= 400
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
