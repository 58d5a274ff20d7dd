//! Crawler module for manifest and availability-file fetching
//!
//! This module contains the core crawling logic, including:
//! - Conditional HTTP fetching with freshness headers
//! - The rate-limited resource cache in front of the network
//! - Manifest document parsing
//! - Manifest polling and concurrency scheduling
//! - Overall crawl coordination

mod cache;
mod coordinator;
mod fetcher;
mod manifest;
mod scheduler;

pub use cache::{FetchSource, FetchedResource, ResourceFetcher, UrlLockGuard, UrlLocks};
pub use coordinator::{run_crawl, Coordinator, ManifestOutcome};
pub use fetcher::{build_http_client, send_conditional, ConditionalHeaders, HttpOutcome};
pub use manifest::{parse_manifest, ManifestFile, ManifestOutput, OutputExtension};
pub use scheduler::{should_fetch_manifest, ManifestPlan, ScheduledManifest, Scheduler};
