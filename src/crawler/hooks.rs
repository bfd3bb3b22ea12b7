//! Request and response hooks
//!
//! Hooks run in registration order around every fetch. Each one may rewrite
//! the value it is given or veto it; a veto stops the rest of the chain.

use crate::state::{CrawlRequest, CrawlResponse};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Result of a hook invocation
#[derive(Debug, Clone, PartialEq)]
pub enum HookAction<T> {
    /// Pass on the (possibly rewritten) value
    Continue(T),

    /// Drop the value
    Veto,
}

impl<T> HookAction<T> {
    pub fn is_veto(&self) -> bool {
        matches!(self, HookAction::Veto)
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            HookAction::Continue(value) => Some(value),
            HookAction::Veto => None,
        }
    }
}

#[async_trait]
pub trait Hook: Send + Sync {
    /// Called before a request is fetched
    ///
    /// A veto releases the request's budget slot without counting a page.
    async fn on_request(&self, request: CrawlRequest) -> HookAction<CrawlRequest> {
        HookAction::Continue(request)
    }

    /// Called after a fetch completes
    ///
    /// A veto still counts the page as crawled but skips extraction.
    async fn on_response(&self, response: CrawlResponse) -> HookAction<CrawlResponse> {
        HookAction::Continue(response)
    }
}

/// Ordered list of hooks
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub async fn on_request(&self, mut request: CrawlRequest) -> HookAction<CrawlRequest> {
        for hook in &self.hooks {
            match hook.on_request(request).await {
                HookAction::Continue(next) => request = next,
                HookAction::Veto => return HookAction::Veto,
            }
        }
        HookAction::Continue(request)
    }

    pub async fn on_response(&self, mut response: CrawlResponse) -> HookAction<CrawlResponse> {
        for hook in &self.hooks {
            match hook.on_response(response).await {
                HookAction::Continue(next) => response = next,
                HookAction::Veto => return HookAction::Veto,
            }
        }
        HookAction::Continue(response)
    }
}

impl std::fmt::Debug for HookChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookChain")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Logs every request and response at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHook;

#[async_trait]
impl Hook for LoggingHook {
    async fn on_request(&self, request: CrawlRequest) -> HookAction<CrawlRequest> {
        debug!(
            "Requesting {} (depth {}, priority {})",
            request.url, request.depth, request.priority
        );
        HookAction::Continue(request)
    }

    async fn on_response(&self, response: CrawlResponse) -> HookAction<CrawlResponse> {
        match &response.error {
            Some(error) => debug!("Response {} {}: {}", response.status, response.url, error),
            None if response.from_cache => {
                debug!("Response {} {} (cached)", response.status, response.url)
            }
            None => debug!("Response {} {}", response.status, response.url),
        }
        HookAction::Continue(response)
    }
}

/// Adds fixed headers to every request
#[derive(Debug, Clone, Default)]
pub struct HeaderHook {
    headers: Vec<(String, String)>,
}

impl HeaderHook {
    pub fn new<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl Hook for HeaderHook {
    async fn on_request(&self, mut request: CrawlRequest) -> HookAction<CrawlRequest> {
        for (name, value) in &self.headers {
            request.set_header(name.clone(), value.clone());
        }
        HookAction::Continue(request)
    }
}

/// Vetoes responses whose status is not in the allowed set
#[derive(Debug, Clone)]
pub struct StatusFilterHook {
    allowed: HashSet<u16>,
}

impl StatusFilterHook {
    pub fn new(allowed: impl IntoIterator<Item = u16>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl Default for StatusFilterHook {
    fn default() -> Self {
        Self::new([200])
    }
}

#[async_trait]
impl Hook for StatusFilterHook {
    async fn on_response(&self, response: CrawlResponse) -> HookAction<CrawlResponse> {
        if self.allowed.contains(&response.status) {
            HookAction::Continue(response)
        } else {
            debug!("Filtered {} with status {}", response.url, response.status);
            HookAction::Veto
        }
    }
}
