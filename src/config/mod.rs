//! Configuration module for the crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and reading plain-text manifest lists.
//!
//! # Example
//!
//! ```no_run
//! use availability_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawler.toml")).unwrap();
//! println!("Rate-limit window: {}s", config.crawler.rate_limit_window);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, FetchOptions, FetchPolicy, ManifestEntry, OutputConfig,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, load_manifest_urls};

pub use validation::validate;
pub(crate) use validation::validate_manifest_url;
