//! Live crawl counters and the end-of-run summary
//!
//! A `CrawlStats` is created per run and shared by `Arc` between manifest
//! tasks. `snapshot` turns it into an immutable `CrawlSummary`.

use crate::crawler::FetchSource;
use crate::state::ResourceKind;
use crate::url::host_of;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Outcome of one attempt to obtain a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched,
    Revalidated,
    Cached,
    RateLimited,
    Failed,
}

impl From<FetchSource> for FetchOutcome {
    fn from(source: FetchSource) -> Self {
        match source {
            FetchSource::Network => Self::Fetched,
            FetchSource::Revalidated => Self::Revalidated,
            FetchSource::Cache => Self::Cached,
        }
    }
}

/// Per-outcome counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub fetched: u64,
    pub revalidated: u64,
    pub cached: u64,
    pub rate_limited: u64,
    pub failed: u64,
}

impl OutcomeCounts {
    fn record(&mut self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Fetched => self.fetched += 1,
            FetchOutcome::Revalidated => self.revalidated += 1,
            FetchOutcome::Cached => self.cached += 1,
            FetchOutcome::RateLimited => self.rate_limited += 1,
            FetchOutcome::Failed => self.failed += 1,
        }
    }

    fn merge(&mut self, other: &OutcomeCounts) {
        self.fetched += other.fetched;
        self.revalidated += other.revalidated;
        self.cached += other.cached;
        self.rate_limited += other.rate_limited;
        self.failed += other.failed;
    }

    /// Bodies obtained, from the network or the cache
    pub fn successes(&self) -> u64 {
        self.fetched + self.revalidated + self.cached
    }

    pub fn total(&self) -> u64 {
        self.successes() + self.rate_limited + self.failed
    }
}

impl fmt::Display for OutcomeCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fetched, {} revalidated, {} cached, {} rate limited, {} failed",
            self.fetched, self.revalidated, self.cached, self.rate_limited, self.failed
        )
    }
}

#[derive(Debug, Default)]
struct StatsInner {
    by_kind: BTreeMap<ResourceKind, OutcomeCounts>,
    by_host: BTreeMap<String, OutcomeCounts>,
    unsupported_descriptors: u64,
    manifests_not_due: u64,
    started_at: Option<DateTime<Utc>>,
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

/// Thread-safe crawl counters
#[derive(Debug, Default)]
pub struct CrawlStats {
    inner: Mutex<StatsInner>,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, StatsInner> {
        // Counters stay meaningful even if a holder panicked mid-update
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears the counters and marks the start of a run
    pub fn start(&self, at: DateTime<Utc>) {
        *self.inner() = StatsInner {
            started_at: Some(at),
            started: Some(Instant::now()),
            ..StatsInner::default()
        };
    }

    /// Freezes the run duration
    pub fn finish(&self) {
        let mut inner = self.inner();
        inner.elapsed = inner.started.map(|s| s.elapsed());
    }

    /// Records the outcome of one fetch
    pub fn record(&self, kind: ResourceKind, url: &str, outcome: FetchOutcome) {
        let host = host_of(url).unwrap_or_else(|| "unknown".to_string());
        let mut inner = self.inner();
        inner.by_kind.entry(kind).or_default().record(outcome);
        inner.by_host.entry(host).or_default().record(outcome);
    }

    /// Records a descriptor skipped for its file type or shape
    pub fn record_unsupported(&self) {
        self.inner().unsupported_descriptors += 1;
    }

    /// Records a known manifest skipped because it is not yet due
    pub fn record_not_due(&self) {
        self.inner().manifests_not_due += 1;
    }

    pub fn snapshot(&self) -> CrawlSummary {
        let inner = self.inner();
        let duration = inner
            .elapsed
            .or_else(|| inner.started.map(|s| s.elapsed()))
            .unwrap_or_default();

        CrawlSummary {
            run_id: None,
            started_at: inner.started_at,
            duration,
            by_kind: inner.by_kind.clone(),
            by_host: inner.by_host.clone(),
            unsupported_descriptors: inner.unsupported_descriptors,
            manifests_not_due: inner.manifests_not_due,
        }
    }
}

/// Summary statistics for a crawl
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlSummary {
    pub run_id: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub duration: Duration,
    pub by_kind: BTreeMap<ResourceKind, OutcomeCounts>,
    pub by_host: BTreeMap<String, OutcomeCounts>,
    pub unsupported_descriptors: u64,
    pub manifests_not_due: u64,
}

impl CrawlSummary {
    /// Counters for one resource kind
    pub fn kind(&self, kind: ResourceKind) -> OutcomeCounts {
        self.by_kind.get(&kind).copied().unwrap_or_default()
    }

    /// Counters across every kind
    pub fn totals(&self) -> OutcomeCounts {
        let mut totals = OutcomeCounts::default();
        for counts in self.by_kind.values() {
            totals.merge(counts);
        }
        totals
    }
}

impl fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.run_id {
            Some(id) => writeln!(f, "=== Crawl Run {} ===", id)?,
            None => writeln!(f, "=== Crawl Run ===")?,
        }
        writeln!(f, "Duration: {:.1}s", self.duration.as_secs_f64())?;
        writeln!(f, "Manifests not yet due: {}", self.manifests_not_due)?;
        writeln!(
            f,
            "Unsupported descriptors skipped: {}",
            self.unsupported_descriptors
        )?;

        writeln!(f, "\nBy resource type:")?;
        for (kind, counts) in &self.by_kind {
            writeln!(f, "  {}: {}", kind, counts)?;
        }

        if !self.by_host.is_empty() {
            writeln!(f, "\nBy host:")?;
            for (host, counts) in &self.by_host {
                writeln!(f, "  {}: {}", host, counts)?;
            }
        }

        write!(f, "\nTotal: {}", self.totals())
    }
}
