//! Scheduler for deciding which manifests to crawl and how many at once
//!
//! This module handles:
//! - The per-manifest polling decision (`should_fetch_manifest`)
//! - Dry-run planning for every known manifest
//! - Global concurrency limiting via a semaphore

use crate::storage::{KnownManifest, ManifestFetchRecord};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Returns whether a manifest may be fetched again at `now`
///
/// Only the latest fetch matters, whatever its status. A manifest never fetched
/// is always due.
///
/// # Arguments
///
/// * `last_fetch` - The latest recorded fetch of the manifest
/// * `now` - The current time
/// * `default_interval` - Wait applied when the fetch carried no polling hint
pub fn should_fetch_manifest(
    last_fetch: Option<&ManifestFetchRecord>,
    now: DateTime<Utc>,
    default_interval: Duration,
) -> bool {
    match last_fetch {
        None => true,
        Some(fetch) => fetch.next_fetch_at(default_interval) <= now,
    }
}

/// The polling decision for one known manifest
#[derive(Debug, Clone)]
pub struct ManifestPlan {
    pub manifest: KnownManifest,
    pub last_fetch: Option<ManifestFetchRecord>,
    /// Earliest time the manifest may be fetched; `None` if never fetched
    pub next_fetch_at: Option<DateTime<Utc>>,
    pub due: bool,
}

impl ManifestPlan {
    pub fn new(
        manifest: KnownManifest,
        last_fetch: Option<ManifestFetchRecord>,
        now: DateTime<Utc>,
        default_interval: Duration,
    ) -> Self {
        let due = should_fetch_manifest(last_fetch.as_ref(), now, default_interval);
        let next_fetch_at = last_fetch
            .as_ref()
            .map(|fetch| fetch.next_fetch_at(default_interval));
        Self {
            manifest,
            last_fetch,
            next_fetch_at,
            due,
        }
    }
}

/// A manifest cleared to run, holding one concurrency permit
pub struct ScheduledManifest {
    pub manifest: KnownManifest,

    /// Released when the crawl task finishes
    pub _permit: OwnedSemaphorePermit,
}

/// Hands out due manifests, at most `max_concurrent` at a time
pub struct Scheduler {
    semaphore: Arc<Semaphore>,
    queue: VecDeque<KnownManifest>,
}

impl Scheduler {
    /// Creates a scheduler over the given due manifests, in order
    pub fn new(max_concurrent: u32, due: Vec<KnownManifest>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1) as usize)),
            queue: due.into(),
        }
    }

    /// Waits for a free slot and returns the next manifest
    ///
    /// # Returns
    ///
    /// * `Some(ScheduledManifest)` - The next manifest, with its permit
    /// * `None` - Every manifest has been handed out
    pub async fn next_manifest(&mut self) -> Option<ScheduledManifest> {
        if self.queue.is_empty() {
            return None;
        }

        let permit = Arc::clone(&self.semaphore).acquire_owned().await.ok()?;
        let manifest = self.queue.pop_front()?;

        Some(ScheduledManifest {
            manifest,
            _permit: permit,
        })
    }
}
