use url::Url;

/// Extracts the host from a URL, lowercased
///
/// Crawl statistics group resources by host, so `Example.COM` and `example.com`
/// must land in the same bucket. The port is not part of the host.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use availability_crawler::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM:8443/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Parses `raw` and extracts its host
///
/// Returns `None` for malformed URLs and URLs without a host.
pub fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw).ok().as_ref().and_then(extract_host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_simple_host() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(extract_host(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_with_port() {
        let url = Url::parse("http://127.0.0.1:8080/manifest").unwrap();
        assert_eq!(extract_host(&url), Some("127.0.0.1".to_string()));
    }

    #[test]
    fn test_extract_mixed_case() {
        let url = Url::parse("https://Scheduling.Example.COM/$bulk-publish").unwrap();
        assert_eq!(
            extract_host(&url),
            Some("scheduling.example.com".to_string())
        );
    }

    #[test]
    fn test_host_of_malformed() {
        assert_eq!(host_of("not a url"), None);
        assert_eq!(host_of("mailto:someone@example.com"), None);
        assert_eq!(
            host_of("https://example.com/locations.ndjson"),
            Some("example.com".to_string())
        );
    }
}
