//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! ledger statistics from the storage layer.

use crate::state::{Jurisdiction, LeafKind};
use crate::storage::{RunRecord, Storage};
use crate::Result;
use std::collections::BTreeMap;

/// Fetch counts for one ledger table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounts {
    pub total: u64,
    pub successful: u64,
}

impl LedgerCounts {
    pub fn failed(&self) -> u64 {
        self.total.saturating_sub(self.successful)
    }
}

/// Crawl statistics summary
#[derive(Debug, Clone, Default)]
pub struct LedgerStatistics {
    /// Number of registered root manifests
    pub known_manifests: u64,

    /// Number of network attempts ever made
    pub fetch_attempts: u64,

    /// Number of URLs with a cached copy
    pub cache_entries: u64,

    pub manifest_fetches: LedgerCounts,

    pub leaf_fetches: BTreeMap<LeafKind, LedgerCounts>,

    /// Tag counts per jurisdiction, only those with at least one tag
    pub jurisdiction_tags: Vec<(Jurisdiction, u64)>,

    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(LedgerStatistics)` - Successfully loaded statistics
/// * `Err(CrawlerError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<LedgerStatistics> {
    let manifest_fetches = LedgerCounts {
        total: storage.count_manifest_fetches(false)?,
        successful: storage.count_manifest_fetches(true)?,
    };

    let mut leaf_fetches = BTreeMap::new();
    for kind in LeafKind::ALL {
        leaf_fetches.insert(
            kind,
            LedgerCounts {
                total: storage.count_leaf_fetches(kind, false)?,
                successful: storage.count_leaf_fetches(kind, true)?,
            },
        );
    }

    Ok(LedgerStatistics {
        known_manifests: storage.count_known_manifests()?,
        fetch_attempts: storage.count_fetch_attempts()?,
        cache_entries: storage.count_cache_entries()?,
        manifest_fetches,
        leaf_fetches,
        jurisdiction_tags: storage.count_jurisdiction_tags()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &LedgerStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Known manifests: {}", stats.known_manifests);
    println!("  Fetch attempts: {}", stats.fetch_attempts);
    println!("  Cached resources: {}", stats.cache_entries);
    println!();

    println!("Ledger:");
    print_counts("manifest", &stats.manifest_fetches);
    for (kind, counts) in &stats.leaf_fetches {
        print_counts(&kind.to_string(), counts);
    }
    println!();

    if !stats.jurisdiction_tags.is_empty() {
        println!("Jurisdiction Tags:");
        // Sort by count (descending)
        let mut tags = stats.jurisdiction_tags.clone();
        tags.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        for (jurisdiction, count) in tags {
            println!("  {}: {}", jurisdiction, count);
        }
        println!();
    }

    match &stats.latest_run {
        Some(run) => println!(
            "Latest run: #{} ({:?}, started {})",
            run.id, run.status, run.started_at
        ),
        None => println!("No crawl runs recorded"),
    }
}

fn print_counts(label: &str, counts: &LedgerCounts) {
    let success_rate = if counts.total > 0 {
        (counts.successful as f64 / counts.total as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "  {}: {} fetches, {} failed ({:.1}% success)",
        label,
        counts.total,
        counts.failed(),
        success_rate
    );
}
