use crate::auth::{AuthError, AuthResult, Authenticator};
use crate::crawler::HttpSession;
use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

/// Injects pre-obtained session cookies and optionally verifies them
///
/// When a check URL is configured, a GET to it must return a 2xx status or the
/// crawl is aborted with `AuthError::SessionInvalid`.
#[derive(Debug, Clone)]
pub struct CookieAuthenticator {
    base_url: Url,
    cookies: Vec<(String, String)>,
    check_url: Option<Url>,
}

impl CookieAuthenticator {
    pub fn new(base_url: &str) -> AuthResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| AuthError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        Ok(Self {
            base_url,
            cookies: Vec::new(),
            check_url: None,
        })
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// URL that only an authenticated session can load
    pub fn with_check_url(mut self, check_url: &str) -> AuthResult<Self> {
        let url = self
            .base_url
            .join(check_url)
            .map_err(|e| AuthError::InvalidUrl(format!("{}: {}", check_url, e)))?;
        self.check_url = Some(url);
        Ok(self)
    }
}

#[async_trait]
impl Authenticator for CookieAuthenticator {
    async fn ensure_authenticated(&self, session: &HttpSession) -> AuthResult<()> {
        for (name, value) in &self.cookies {
            session
                .jar
                .add_cookie_str(&format!("{}={}; Path=/", name, value), &self.base_url);
        }
        debug!(
            "Added {} session cookies for {}",
            self.cookies.len(),
            self.base_url
        );

        let Some(check_url) = &self.check_url else {
            return Ok(());
        };

        let status = session.client.get(check_url.clone()).send().await?.status();
        if !status.is_success() {
            return Err(AuthError::SessionInvalid {
                url: check_url.to_string(),
                status: status.as_u16(),
            });
        }

        info!("Session verified against {}", check_url);
        Ok(())
    }
}
