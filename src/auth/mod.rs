//! Session authentication run once before a crawl starts
//!
//! An authenticator receives the shared HTTP session (client and cookie jar)
//! and must leave it ready for crawling. Any error aborts the crawl before the
//! first page is fetched.

mod cookie;

pub use cookie::CookieAuthenticator;

use crate::crawler::HttpSession;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Session check request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Session invalid: {url} returned status {status}")]
    SessionInvalid { url: String, status: u16 },

    #[error("Invalid authentication URL: {0}")]
    InvalidUrl(String),
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn ensure_authenticated(&self, session: &HttpSession) -> AuthResult<()>;
}

/// Leaves the session untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuthenticator;

#[async_trait]
impl Authenticator for NoopAuthenticator {
    async fn ensure_authenticated(&self, _session: &HttpSession) -> AuthResult<()> {
        Ok(())
    }
}
