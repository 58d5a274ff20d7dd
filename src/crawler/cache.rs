//! Cache-aware resource fetching
//!
//! `ResourceFetcher::fetch` is the only way the crawler touches the network.
//! For every call it re-reads the cache entry and last attempt for the URL,
//! decides between serving the cache, refusing (rate limited) or revalidating,
//! and records exactly one attempt row for every network call it makes.

use crate::config::{FetchOptions, FetchPolicy};
use crate::crawler::fetcher::{send_conditional, ConditionalHeaders, HttpOutcome};
use crate::state::{decide, FetchDecision};
use crate::storage::{
    to_stored_precision, CacheEntry, CacheWrite, FetchAttempt, SqliteStorage, Storage,
    StorageError, STATUS_OK,
};
use crate::{CrawlerError, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;

/// Locks the shared storage, mapping a poisoned mutex to a storage error
pub(crate) fn lock_storage(
    storage: &Mutex<SqliteStorage>,
) -> std::result::Result<MutexGuard<'_, SqliteStorage>, StorageError> {
    storage.lock().map_err(|_| StorageError::LockPoisoned)
}

/// One async mutex per URL
///
/// Holding a URL's lock serializes the whole read-decide-fetch-record sequence
/// for that URL within this process. An entry is dropped from the map once no
/// task holds or waits on it.
#[derive(Debug, Default)]
pub struct UrlLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Exclusive access to one URL, released on drop
pub struct UrlLockGuard<'a> {
    locks: &'a UrlLocks,
    url: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl UrlLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        // Every update is a single insert or remove, so a poisoned map is consistent
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for exclusive access to `url`
    pub async fn lock(&self, url: &str) -> UrlLockGuard<'_> {
        let lock = self.map().entry(url.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;
        UrlLockGuard {
            locks: self,
            url: url.to_string(),
            guard: Some(guard),
        }
    }

    /// Forgets `url` if the map holds the only reference to its mutex
    fn release(&self, url: &str) {
        let mut map = self.map();
        if map.get(url).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            map.remove(url);
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.map().len()
    }
}

impl Drop for UrlLockGuard<'_> {
    fn drop(&mut self) {
        // The owned guard keeps a reference to the mutex; drop it first
        self.guard.take();
        self.locks.release(&self.url);
    }
}

/// Where a fetched body came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    /// 200 from the network
    Network,
    /// 304 from the network; body from the cache
    Revalidated,
    /// Fresh cache entry, no network call
    Cache,
}

/// A successfully fetched document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    pub body: String,
    /// Always 200: revalidated and cache-served bodies count as successes
    pub status_code: u16,
    /// Server-suggested re-poll interval, in seconds
    pub polling_hint_sec: Option<u64>,
    pub source: FetchSource,
}

impl FetchedResource {
    fn from_cache(entry: CacheEntry, now: DateTime<Utc>) -> Self {
        Self {
            polling_hint_sec: Some(entry.remaining(now).as_secs()),
            body: entry.data,
            status_code: STATUS_OK,
            source: FetchSource::Cache,
        }
    }
}

/// Fetches resources through the cache, the attempt log and the network
#[derive(Clone)]
pub struct ResourceFetcher {
    client: Client,
    storage: Arc<Mutex<SqliteStorage>>,
    policy: FetchPolicy,
    locks: Arc<UrlLocks>,
}

impl ResourceFetcher {
    /// Creates a fetcher sharing `storage` with the rest of the crawler
    ///
    /// The client should be built with `policy.request_timeout`; see
    /// [`crate::crawler::build_http_client`].
    pub fn new(client: Client, storage: Arc<Mutex<SqliteStorage>>, policy: FetchPolicy) -> Self {
        Self {
            client,
            storage,
            policy,
            locks: Arc::new(UrlLocks::new()),
        }
    }

    /// Fetches `url` as of `now`
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL of the resource
    /// * `now` - Logical time of the fetch; recorded on the attempt and cache rows
    /// * `options` - Per-call cache and rate-limit switches
    ///
    /// # Returns
    ///
    /// * `Ok(FetchedResource)` - Body from the network (200), the cache after a
    ///   304, or a fresh cache entry
    /// * `Err(CrawlerError::RateLimited)` - The last attempt is inside the
    ///   rate-limit window; nothing was sent or recorded
    /// * `Err(CrawlerError::FetchFailed)` - Non-200/304 status or transport error;
    ///   the attempt was recorded and the cache left untouched
    /// * `Err(CrawlerError::Storage)` - The cache or attempt log could not be read
    ///   or written
    pub async fn fetch(
        &self,
        url: &str,
        now: DateTime<Utc>,
        options: &FetchOptions,
    ) -> Result<FetchedResource> {
        let now = to_stored_precision(now);
        let _guard = self.locks.lock(url).await;

        let (entry, last_attempt) = {
            let storage = lock_storage(&self.storage)?;
            (storage.get_cache_entry(url)?, storage.last_fetch_attempt(url)?)
        };

        match decide(
            entry.as_ref(),
            last_attempt.as_ref(),
            now,
            self.policy.rate_limit_window,
            options,
        ) {
            FetchDecision::ServeCached => {
                if let Some(entry) = entry {
                    tracing::debug!("Serving {} from cache (expires {})", url, entry.expires_at);
                    return Ok(FetchedResource::from_cache(entry, now));
                }
            }
            FetchDecision::RateLimited {
                elapsed_secs,
                retry_after,
            } => {
                tracing::debug!("Rate limited {} until {}", url, retry_after);
                return Err(CrawlerError::RateLimited {
                    url: url.to_string(),
                    elapsed_secs,
                    window_secs: self.policy.rate_limit_window.as_secs(),
                });
            }
            FetchDecision::Revalidate => {}
        }

        let headers = ConditionalHeaders::for_entry(entry.as_ref(), options);
        let outcome = send_conditional(&self.client, url, &headers).await;

        let (status_code, write, result) = self.resolve(url, now, entry, outcome, options);

        let attempt = FetchAttempt {
            url: url.to_string(),
            fetch_at: now,
            status_code,
        };
        lock_storage(&self.storage)?.commit_fetch(&attempt, &write)?;

        result
    }

    /// Maps a network outcome to the attempt status, the cache mutation and the
    /// caller's result
    fn resolve(
        &self,
        url: &str,
        now: DateTime<Utc>,
        entry: Option<CacheEntry>,
        outcome: HttpOutcome,
        options: &FetchOptions,
    ) -> (u16, CacheWrite, Result<FetchedResource>) {
        match outcome {
            HttpOutcome::Modified {
                body,
                etag,
                freshness,
            } => {
                let expires_at = freshness.expires_at(now, self.policy.default_expiration);
                tracing::debug!("Fetched {} ({} bytes, expires {})", url, body.len(), expires_at);

                let write = if options.suppress_cache_write {
                    CacheWrite::None
                } else {
                    CacheWrite::Replace(CacheEntry {
                        url: url.to_string(),
                        fetch_at: now,
                        expires_at,
                        etag,
                        data: body.clone(),
                    })
                };

                let fetched = FetchedResource {
                    body,
                    status_code: STATUS_OK,
                    polling_hint_sec: freshness.polling_hint_sec(),
                    source: FetchSource::Network,
                };
                (STATUS_OK, write, Ok(fetched))
            }

            HttpOutcome::NotModified { etag, freshness } => {
                let status = 304;
                let Some(entry) = entry else {
                    return (
                        status,
                        CacheWrite::None,
                        Err(CrawlerError::FetchFailed {
                            url: url.to_string(),
                            status: Some(status),
                            message: "304 Not Modified without a cached copy".to_string(),
                        }),
                    );
                };

                let expires_at = freshness.expires_at(now, self.policy.default_expiration);
                tracing::debug!("{} not modified, now expires {}", url, expires_at);

                let write = if options.suppress_cache_write {
                    CacheWrite::None
                } else {
                    CacheWrite::Refresh {
                        fetch_at: now,
                        expires_at,
                        etag,
                    }
                };

                let fetched = FetchedResource {
                    body: entry.data,
                    status_code: STATUS_OK,
                    polling_hint_sec: freshness.polling_hint_sec(),
                    source: FetchSource::Revalidated,
                };
                (status, write, Ok(fetched))
            }

            HttpOutcome::HttpError { status_code } => (
                status_code,
                CacheWrite::None,
                Err(CrawlerError::FetchFailed {
                    url: url.to_string(),
                    status: Some(status_code),
                    message: format!("HTTP {}", status_code),
                }),
            ),

            HttpOutcome::NetworkError { error } => (
                0,
                CacheWrite::None,
                Err(CrawlerError::FetchFailed {
                    url: url.to_string(),
                    status: None,
                    message: error,
                }),
            ),
        }
    }
}
