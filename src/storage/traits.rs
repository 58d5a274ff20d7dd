//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{Jurisdiction, LeafKind};
use crate::storage::{
    CacheEntry, CacheWrite, FetchAttempt, KnownManifest, LeafFetchRecord, LedgerEntry,
    ManifestFetchRecord, RunRecord, RunStatus,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Known manifest not found: {0}")]
    ManifestNotFound(i64),

    #[error("Manifest fetch not found: {0}")]
    ManifestFetchNotFound(i64),

    #[error("No cache entry to refresh for {0}")]
    CacheEntryNotFound(String),

    #[error("Invalid timestamp in database: {0}")]
    InvalidTimestamp(f64),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the crawler. The ledger
/// methods only ever insert: nothing in this interface updates or deletes a
/// manifest fetch, leaf fetch, jurisdiction tag or fetch attempt.
pub trait Storage {
    // ===== Known Manifests =====

    /// Registers a manifest URL, returning the existing id if already known
    fn add_known_manifest(&mut self, url: &str) -> StorageResult<i64>;

    /// Loads all known manifests in id order
    fn load_known_manifests(&self) -> StorageResult<Vec<KnownManifest>>;

    /// Gets a known manifest by id
    fn get_known_manifest(&self, id: i64) -> StorageResult<KnownManifest>;

    // ===== Resource Cache =====

    /// Gets the current cache entry for a URL
    fn get_cache_entry(&self, url: &str) -> StorageResult<Option<CacheEntry>>;

    // ===== Fetch Attempt Log =====

    /// Gets the most recent network attempt on a URL
    fn last_fetch_attempt(&self, url: &str) -> StorageResult<Option<FetchAttempt>>;

    /// Gets every recorded attempt on a URL, oldest first
    fn get_fetch_attempts(&self, url: &str) -> StorageResult<Vec<FetchAttempt>>;

    /// Appends a fetch attempt and applies the cache mutation atomically
    ///
    /// A `CacheWrite::Refresh` for a URL without a cache entry fails with
    /// `StorageError::CacheEntryNotFound` and rolls back the attempt as well.
    fn commit_fetch(&mut self, attempt: &FetchAttempt, write: &CacheWrite) -> StorageResult<()>;

    // ===== Crawl Ledger =====

    /// Appends a manifest fetch and returns its id
    fn insert_manifest_fetch(
        &mut self,
        known_manifest_id: i64,
        entry: &LedgerEntry,
    ) -> StorageResult<i64>;

    /// Gets the latest manifest fetch for a known manifest
    ///
    /// If `only_success` is set, only successful fetches are considered.
    fn last_manifest_fetch(
        &self,
        known_manifest_id: i64,
        only_success: bool,
    ) -> StorageResult<Option<ManifestFetchRecord>>;

    /// Gets a manifest fetch by id
    fn get_manifest_fetch(&self, id: i64) -> StorageResult<ManifestFetchRecord>;

    /// Appends a leaf fetch together with its jurisdiction tags
    ///
    /// The manifest fetch must exist. Returns the new leaf fetch id.
    fn insert_leaf_fetch(
        &mut self,
        kind: LeafKind,
        manifest_fetch_id: i64,
        entry: &LedgerEntry,
        jurisdictions: &[Jurisdiction],
    ) -> StorageResult<i64>;

    /// Gets the leaf fetches of one kind recorded under a manifest fetch
    fn get_leaf_fetches(
        &self,
        kind: LeafKind,
        manifest_fetch_id: i64,
    ) -> StorageResult<Vec<LeafFetchRecord>>;

    /// Gets the jurisdictions tagged on a leaf fetch
    fn get_leaf_jurisdictions(
        &self,
        kind: LeafKind,
        leaf_fetch_id: i64,
    ) -> StorageResult<Vec<Jurisdiction>>;

    // ===== Run Management =====

    /// Creates a new crawl run in the `running` state
    fn create_run(&mut self, config_hash: &str, started_at: DateTime<Utc>) -> StorageResult<i64>;

    /// Records the end of a run
    fn finish_run(
        &mut self,
        run_id: i64,
        finished_at: DateTime<Utc>,
        status: RunStatus,
    ) -> StorageResult<()>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Statistics =====

    fn count_known_manifests(&self) -> StorageResult<u64>;

    fn count_fetch_attempts(&self) -> StorageResult<u64>;

    fn count_cache_entries(&self) -> StorageResult<u64>;

    /// Counts manifest fetches, optionally only the successful ones
    fn count_manifest_fetches(&self, only_success: bool) -> StorageResult<u64>;

    /// Counts leaf fetches of one kind, optionally only the successful ones
    fn count_leaf_fetches(&self, kind: LeafKind, only_success: bool) -> StorageResult<u64>;

    /// Counts jurisdiction tags per code across all leaf kinds
    fn count_jurisdiction_tags(&self) -> StorageResult<Vec<(Jurisdiction, u64)>>;
}
