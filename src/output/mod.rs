//! Output module for crawl summaries and reports
//!
//! This module handles:
//! - Live per-run counters and the end-of-run summary
//! - Ledger statistics read back from the database

pub mod stats;
mod summary;

pub use stats::{load_statistics, print_statistics, LedgerCounts, LedgerStatistics};
pub use summary::{CrawlStats, CrawlSummary, FetchOutcome, OutcomeCounts};
