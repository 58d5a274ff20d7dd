//! URL handling module
//!
//! This module provides resource URL validation, resolution of descriptor URLs
//! found inside manifests, and host extraction for crawl statistics.

mod host;

pub use host::{extract_host, host_of};

use crate::UrlError;
use url::Url;

/// Parses a resource URL and checks that it can be crawled
///
/// Only absolute `http` and `https` URLs with a host are accepted.
pub fn parse_resource_url(raw: &str) -> Result<Url, UrlError> {
    let url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost(raw.to_string()));
    }

    Ok(url)
}

/// Resolves the URL of a manifest output descriptor
///
/// Publishers are expected to list absolute URLs, but relative references are
/// resolved against the manifest URL rather than rejected.
///
/// # Examples
///
/// ```
/// use availability_crawler::url::resolve_descriptor_url;
///
/// let resolved = resolve_descriptor_url(
///     "https://example.com/api/$bulk-publish",
///     "locations.ndjson",
/// ).unwrap();
/// assert_eq!(resolved, "https://example.com/api/locations.ndjson");
/// ```
pub fn resolve_descriptor_url(manifest_url: &str, raw: &str) -> Result<String, UrlError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(UrlError::Parse("empty descriptor URL".to_string()));
    }

    let resolved = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = parse_resource_url(manifest_url)?;
            base.join(raw)
                .map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?
        }
        Err(e) => return Err(UrlError::Parse(format!("{}: {}", raw, e))),
    };

    Ok(parse_resource_url(resolved.as_str())?.to_string())
}
