use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for the crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetch: FetchOptions,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "manifest")]
    pub manifests: Vec<ManifestEntry>,
}

/// Crawler timing configuration (all values in seconds)
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Minimum interval between two network attempts on the same URL
    #[serde(rename = "rate-limit-window", default = "default_rate_limit_window")]
    pub rate_limit_window: u64,

    /// Upper bound on a single HTTP request
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Cache lifetime applied when a response carries no freshness headers
    #[serde(rename = "default-expiration", default = "default_expiration")]
    pub default_expiration: u64,

    /// Manifest re-poll interval when the last fetch carried no polling hint
    #[serde(
        rename = "default-polling-interval",
        default = "default_polling_interval"
    )]
    pub default_polling_interval: u64,

    /// Maximum number of manifests crawled at once
    #[serde(
        rename = "max-concurrent-manifests",
        default = "default_max_concurrent_manifests"
    )]
    pub max_concurrent_manifests: u32,
}

fn default_rate_limit_window() -> u64 {
    90
}

fn default_request_timeout() -> u64 {
    10
}

fn default_expiration() -> u64 {
    120
}

fn default_polling_interval() -> u64 {
    180
}

fn default_max_concurrent_manifests() -> u32 {
    4
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            rate_limit_window: default_rate_limit_window(),
            request_timeout: default_request_timeout(),
            default_expiration: default_expiration(),
            default_polling_interval: default_polling_interval(),
            max_concurrent_manifests: default_max_concurrent_manifests(),
        }
    }
}

impl CrawlerConfig {
    /// Builds the fetch policy used by the resource fetcher
    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            rate_limit_window: Duration::from_secs(self.rate_limit_window),
            request_timeout: Duration::from_secs(self.request_timeout),
            default_expiration: Duration::from_secs(self.default_expiration),
        }
    }

    pub fn default_polling_interval(&self) -> Duration {
        Duration::from_secs(self.default_polling_interval)
    }
}

/// Timing limits applied to every resource fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    pub rate_limit_window: Duration,
    pub request_timeout: Duration,
    pub default_expiration: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        CrawlerConfig::default().fetch_policy()
    }
}

/// Per-call switches controlling how a fetch interacts with the cache and
/// the attempt log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    /// Never serve from the resource cache and send no validators
    #[serde(rename = "skip-cache")]
    pub skip_cache: bool,

    /// Fetch even when the last attempt falls inside the rate-limit window
    #[serde(rename = "ignore-rate-limiting")]
    pub ignore_rate_limiting: bool,

    /// Do not send `If-None-Match` with the cached ETag
    #[serde(rename = "suppress-if-none-match")]
    pub suppress_if_none_match: bool,

    /// Do not send `If-Modified-Since` with the cached fetch time
    #[serde(rename = "suppress-if-modified-since")]
    pub suppress_if_modified_since: bool,

    /// Leave the resource cache untouched after a successful fetch
    #[serde(rename = "suppress-cache-write")]
    pub suppress_cache_write: bool,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the `User-Agent` header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database holding the cache, attempt log and ledger
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// An operator-configured root manifest
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
}
