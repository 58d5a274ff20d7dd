//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Known manifest registration
//! - The resource cache and the fetch attempt log
//! - The append-only crawl ledger (manifest and leaf fetches, jurisdiction tags)
//! - Crawl run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::LeafKind;
use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use std::time::Duration;

/// HTTP status recorded for successful fetches, including revalidated and
/// cache-served bodies
pub const STATUS_OK: u16 = 200;

/// Drops the sub-microsecond part the database cannot hold
///
/// Times compared against stored rows must go through this first, so that a
/// value read back equals the value written.
pub fn to_stored_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

/// Converts a timestamp to the fractional unix seconds stored in the database
pub(crate) fn to_unix(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / MICROS_PER_SEC
}

/// Converts stored fractional unix seconds back to a timestamp
pub(crate) fn from_unix(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let micros = (secs * MICROS_PER_SEC).round() as i64;
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    Utc.timestamp_opt(micros.div_euclid(1_000_000), nanos).single()
}

const MICROS_PER_SEC: f64 = 1_000_000.0;

/// An operator-configured root manifest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KnownManifest {
    pub id: i64,
    pub url: String,
}

/// One network attempt on a URL, successful or not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    pub url: String,
    pub fetch_at: DateTime<Utc>,
    /// HTTP status, or `0` when no response was received
    pub status_code: u16,
}

/// The current cached copy of a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub url: String,
    pub fetch_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub etag: Option<String>,
    pub data: String,
}

impl CacheEntry {
    /// Returns true while the entry may be served without revalidation
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Remaining lifetime at `now`, zero once stale
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Cache mutation committed together with a fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheWrite {
    /// Leave the cache untouched
    None,
    /// Insert the entry, or overwrite the existing entry for its URL
    Replace(CacheEntry),
    /// Revalidated with 304: bump timestamps in place, keep the body
    Refresh {
        fetch_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        etag: Option<String>,
    },
}

/// A fetch outcome about to be appended to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub url: String,
    pub read_at: DateTime<Utc>,
    pub status_code: u16,
    pub polling_hint_sec: Option<u64>,
    /// Raw body; present iff the fetch succeeded
    pub contents: Option<String>,
}

impl LedgerEntry {
    /// A successful fetch carrying the document body
    pub fn success(
        url: &str,
        read_at: DateTime<Utc>,
        polling_hint_sec: Option<u64>,
        contents: String,
    ) -> Self {
        Self {
            url: url.to_string(),
            read_at,
            status_code: STATUS_OK,
            polling_hint_sec,
            contents: Some(contents),
        }
    }

    /// A failed fetch; contents are always null
    pub fn failure(url: &str, read_at: DateTime<Utc>, status_code: u16) -> Self {
        Self {
            url: url.to_string(),
            read_at,
            status_code,
            polling_hint_sec: None,
            contents: None,
        }
    }
}

/// A row of `manifest_fetches`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFetchRecord {
    pub id: i64,
    pub url: String,
    pub known_manifest_id: i64,
    pub read_at: DateTime<Utc>,
    pub status_code: u16,
    pub polling_hint_sec: Option<u64>,
    pub contents: Option<String>,
}

impl ManifestFetchRecord {
    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK && self.contents.is_some()
    }

    /// Earliest time the manifest may be fetched again
    ///
    /// Uses the recorded polling hint, or `default_interval` when the publisher
    /// gave none.
    pub fn next_fetch_at(&self, default_interval: Duration) -> DateTime<Utc> {
        let wait = self
            .polling_hint_sec
            .map(Duration::from_secs)
            .unwrap_or(default_interval);
        chrono::Duration::from_std(wait)
            .ok()
            .and_then(|wait| self.read_at.checked_add_signed(wait))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// A row of one of the leaf fetch tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafFetchRecord {
    pub id: i64,
    pub kind: LeafKind,
    pub url: String,
    pub manifest_fetch_id: i64,
    pub read_at: DateTime<Utc>,
    pub status_code: u16,
    pub polling_hint_sec: Option<u64>,
    pub contents: Option<String>,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
