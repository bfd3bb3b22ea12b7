//! Network retrieval backends
//!
//! A backend performs exactly one network attempt. Robots checks, rate
//! limiting, retries and caching are layered on top by the `Fetcher`, so an
//! alternate backend (e.g. a headless browser) inherits them unchanged as long
//! as it reports failures as `BackendError`.

use crate::config::{CrawlerConfig, UserAgentConfig};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::{redirect::Policy, Client, Proxy};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Retryable failure of a single network attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Request timeout")]
    Timeout,

    #[error("Connection refused")]
    Connect,

    #[error("{0}")]
    Transport(String),
}

/// What a backend got back from the server
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

/// A single network retrieval
#[async_trait]
pub trait FetchBackend: Send + Sync {
    async fn retrieve(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<RawResponse, BackendError>;
}

/// The shared HTTP client and its cookie jar
///
/// Authenticators receive this handle to establish a session before the crawl.
#[derive(Debug, Clone)]
pub struct HttpSession {
    pub client: Client,
    pub jar: Arc<Jar>,
}

/// Builds the HTTP client used for page and robots.txt fetches
///
/// The User-Agent is formatted as `Name/Version (+ContactURL; ContactEmail)`.
/// Redirects are followed (up to 10 hops) and cookies are kept in a shared jar.
pub fn build_http_client(
    crawler: &CrawlerConfig,
    user_agent: &UserAgentConfig,
) -> Result<HttpSession, reqwest::Error> {
    let jar = Arc::new(Jar::default());
    let timeout = crawler.timeout();

    let mut builder = Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(10))
        .cookie_provider(jar.clone())
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = &crawler.proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    Ok(HttpSession {
        client: builder.build()?,
        jar,
    })
}

/// Plain HTTP GET backend
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
}

impl HttpBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Maps reqwest errors onto the retryable error shape
fn classify_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else if e.is_connect() {
        BackendError::Connect
    } else {
        BackendError::Transport(e.to_string())
    }
}

#[async_trait]
impl FetchBackend for HttpBackend {
    async fn retrieve(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<RawResponse, BackendError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(classify_error)?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(classify_error)?;

        Ok(RawResponse {
            url: final_url,
            status,
            body,
            headers,
        })
    }
}
