use url::Url;

/// Extracts the domain key from a URL
///
/// The key is the lowercase host plus an explicit non-default port, so two
/// servers on the same host but different ports get separate rate limits and
/// domain scopes.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use ergane::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(extract_domain(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Domain key of a URL string; `None` when it does not parse or has no host
pub fn domain_of(url_str: &str) -> Option<String> {
    Url::parse(url_str).ok().as_ref().and_then(extract_domain)
}

/// Origin (`scheme://host[:port]`) used as the robots.txt scope
pub fn origin_of(url: &Url) -> Option<String> {
    extract_domain(url).map(|domain| format!("{}://{}", url.scheme(), domain))
}

/// URL of the robots.txt file governing `url`
pub fn robots_url(url: &Url) -> Option<String> {
    origin_of(url).map(|origin| format!("{}/robots.txt", origin))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_simple_domain() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_subdomain() {
        let url = Url::parse("https://blog.example.com/post").unwrap();
        assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
    }

    #[test]
    fn test_extract_with_port() {
        let url = Url::parse("https://example.com:8080/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com:8080".to_string()));
    }

    #[test]
    fn test_default_port_dropped() {
        let url = Url::parse("https://example.com:443/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_mixed_case() {
        let url = Url::parse("https://Example.COM/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_domain_of_invalid() {
        assert_eq!(domain_of("not a url"), None);
        assert_eq!(domain_of("mailto:a@example.com"), None);
    }

    #[test]
    fn test_robots_url() {
        let url = Url::parse("http://example.com:8080/deep/page?q=1").unwrap();
        assert_eq!(
            robots_url(&url),
            Some("http://example.com:8080/robots.txt".to_string())
        );
    }
}
