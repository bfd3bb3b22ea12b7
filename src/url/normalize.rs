use crate::UrlError;
use url::Url;

/// Normalizes a URL into the key used for frontier de-duplication
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not http(s)
/// 2. Lowercase scheme, host and path
/// 3. Remove the trailing slash from the path (the root path becomes empty)
/// 4. Remove fragment (everything after #)
/// 5. Sort query parameters by name, then value
/// 6. Remove empty query string (trailing ?)
///
/// The result is a comparison key, not a fetchable URL.
///
/// # Examples
///
/// ```
/// use ergane::url::normalize_url;
///
/// let key = normalize_url("https://EX.com/A/?y=2&x=1#top").unwrap();
/// assert_eq!(key, "https://ex.com/a?x=1&y=2");
/// ```
pub fn normalize_url(url_str: &str) -> Result<String, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().ok_or(UrlError::MissingDomain)?.to_lowercase();

    let mut key = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }

    let path = url.path().to_lowercase();
    key.push_str(path.trim_end_matches('/'));

    let query = sorted_query(&url);
    if !query.is_empty() {
        key.push('?');
        key.push_str(&query);
    }

    Ok(key)
}

/// De-duplication key that never fails
///
/// URLs the parser rejects still need a stable key, so they fall back to the
/// trimmed, lowercased input without fragment or trailing slash.
pub fn dedup_key(url_str: &str) -> String {
    normalize_url(url_str).unwrap_or_else(|_| {
        let without_fragment = url_str.split('#').next().unwrap_or(url_str);
        without_fragment.trim().trim_end_matches('/').to_lowercase()
    })
}

/// Re-encodes the query with parameters sorted by name, then value
fn sorted_query(url: &Url) -> String {
    if url.query().map_or(true, str::is_empty) {
        return String::new();
    }

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}
