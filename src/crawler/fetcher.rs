//! HTTP fetcher implementation
//!
//! This module handles the network side of a resource fetch:
//! - Building the HTTP client with the crawler's user agent string
//! - Conditional GET requests (`If-None-Match` / `If-Modified-Since`)
//! - Classifying the response into success, not-modified or failure
//!
//! Deciding *whether* to go to the network, and persisting the outcome, is the
//! job of [`crate::crawler::ResourceFetcher`].

use crate::config::{FetchOptions, UserAgentConfig};
use crate::state::{format_http_date, ResponseFreshness};
use crate::storage::CacheEntry;
use reqwest::header::{
    HeaderName, CACHE_CONTROL, ETAG, EXPIRES, IF_MODIFIED_SINCE, IF_NONE_MATCH,
};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;

/// Result of a single conditional GET
#[derive(Debug)]
pub enum HttpOutcome {
    /// 200 with a new body
    Modified {
        body: String,
        etag: Option<String>,
        freshness: ResponseFreshness,
    },

    /// 304: the cached body is still current
    NotModified {
        etag: Option<String>,
        freshness: ResponseFreshness,
    },

    /// Any other HTTP status
    HttpError { status_code: u16 },

    /// No usable response (connection refused, timeout, truncated body)
    NetworkError { error: String },
}

/// Validators to attach to a GET
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalHeaders {
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
}

impl ConditionalHeaders {
    /// Derives validators from the cached copy of a resource
    ///
    /// Nothing is sent when there is no cached copy or the cache was skipped.
    pub fn for_entry(entry: Option<&CacheEntry>, options: &FetchOptions) -> Self {
        let Some(entry) = entry.filter(|_| !options.skip_cache) else {
            return Self::default();
        };

        Self {
            if_none_match: entry
                .etag
                .clone()
                .filter(|_| !options.suppress_if_none_match),
            if_modified_since: (!options.suppress_if_modified_since)
                .then(|| format_http_date(entry.fetch_at)),
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Upper bound on a whole request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use availability_crawler::config::UserAgentConfig;
/// use availability_crawler::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "AvailabilityCrawler".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(10)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout)
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Sends a GET with the given validators and classifies the response
///
/// Only 200 and 304 count as success.
pub async fn send_conditional(
    client: &Client,
    url: &str,
    headers: &ConditionalHeaders,
) -> HttpOutcome {
    let mut request = client.get(url);

    if let Some(tag) = &headers.if_none_match {
        tracing::debug!("Setting If-None-Match: {}", tag);
        request = request.header(IF_NONE_MATCH, tag.as_str());
    }

    if let Some(since) = &headers.if_modified_since {
        tracing::debug!("Setting If-Modified-Since: {}", since);
        request = request.header(IF_MODIFIED_SINCE, since.as_str());
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => return network_error(e),
    };

    let status = response.status();
    let header = |name: HeaderName| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let etag = header(ETAG);
    let freshness = ResponseFreshness::from_headers(
        header(CACHE_CONTROL).as_deref(),
        header(EXPIRES).as_deref(),
    );

    if status == StatusCode::NOT_MODIFIED {
        return HttpOutcome::NotModified { etag, freshness };
    }

    if status != StatusCode::OK {
        return HttpOutcome::HttpError {
            status_code: status.as_u16(),
        };
    }

    match response.text().await {
        Ok(body) => HttpOutcome::Modified {
            body,
            etag,
            freshness,
        },
        Err(e) => network_error(e),
    }
}

fn network_error(e: reqwest::Error) -> HttpOutcome {
    let error = if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else {
        e.to_string()
    };
    HttpOutcome::NetworkError { error }
}
