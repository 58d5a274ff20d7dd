//! Availability Crawler: a polite manifest crawler
//!
//! This crate discovers and captures published availability documents. A root
//! manifest names Location, Schedule and Slot files; the crawler fetches each of
//! them while honoring HTTP caching headers, server polling hints and a hard
//! per-URL rate-limit floor, and records every outcome in an append-only ledger.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Rate limited: {url} was attempted {elapsed_secs}s ago (window is {window_secs}s)")]
    RateLimited {
        url: String,
        elapsed_secs: i64,
        window_secs: u64,
    },

    #[error("Fetch failed for {url}: {message}")]
    FetchFailed {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Failed to parse {url}: {message}")]
    ParseFailed { url: String, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Crawl task failed: {0}")]
    TaskFailed(String),
}

impl CrawlerError {
    /// Returns true if the error is the rate-limit backpressure signal
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Returns true if the error comes from the persistence layer
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Database(_))
    }

    /// The status code to record in the ledger for a failed fetch
    ///
    /// Transport failures (timeouts, refused connections) have no HTTP status and
    /// are recorded as `0`.
    pub fn ledger_status(&self) -> u16 {
        match self {
            Self::FetchFailed {
                status: Some(code), ..
            } => *code,
            _ => 0,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL: {0}")]
    MissingHost(String),
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

// Re-export commonly used types
pub use config::{Config, FetchOptions};
pub use crawler::{Coordinator, FetchedResource, ResourceFetcher};
pub use output::{CrawlStats, CrawlSummary};
pub use state::{Jurisdiction, LeafType};
pub use storage::{SqliteStorage, Storage};
