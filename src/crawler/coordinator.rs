//! Crawler coordinator - main crawl orchestration logic
//!
//! This module drives a crawl pass:
//! - Registering configured manifests and deciding which are due
//! - Fetching each due manifest and recording it in the ledger
//! - Fanning out to the Location, Schedule and Slot files it lists
//! - Recording leaf fetches with their jurisdiction tags
//! - Tracking the run and its statistics

use crate::config::{validate_manifest_url, Config, FetchOptions};
use crate::crawler::cache::lock_storage;
use crate::crawler::manifest::{parse_manifest, ManifestOutput};
use crate::crawler::scheduler::{self, ManifestPlan, ScheduledManifest, Scheduler};
use crate::crawler::{build_http_client, ResourceFetcher};
use crate::output::{CrawlStats, CrawlSummary, FetchOutcome};
use crate::state::{partition_codes, LeafKind, ResourceKind};
use crate::storage::{
    to_stored_precision, KnownManifest, LedgerEntry, RunStatus, SqliteStorage, Storage,
};
use crate::url::resolve_descriptor_url;
use crate::{CrawlerError, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;

/// What happened to one manifest during a crawl pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestOutcome {
    /// Inside the rate-limit window; nothing was fetched or recorded
    RateLimited,

    /// The fetch failed; a manifest fetch with null contents was recorded
    FetchFailed { manifest_fetch_id: i64 },

    /// The body was recorded but is not a manifest document
    Unparseable { manifest_fetch_id: i64 },

    /// The manifest was recorded and its leaves processed
    Crawled {
        manifest_fetch_id: i64,
        /// Leaf fetches recorded, successful or not
        leaves_recorded: usize,
    },
}

/// Main crawler coordinator structure
///
/// Cloning is cheap; clones share storage, the fetcher and the statistics.
#[derive(Clone)]
pub struct Coordinator {
    config: Arc<Config>,
    storage: Arc<Mutex<SqliteStorage>>,
    fetcher: ResourceFetcher,
    stats: Arc<CrawlStats>,
    options: FetchOptions,
    config_hash: Arc<str>,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// Opens (or creates) the database named by `config.output.database_path`.
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlerError)` - Failed to open the database or build the client
    pub fn new(config: Config) -> Result<Self> {
        let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        Self::with_storage(config, storage)
    }

    /// Creates a coordinator over an already opened storage backend
    pub fn with_storage(config: Config, storage: SqliteStorage) -> Result<Self> {
        let policy = config.crawler.fetch_policy();
        let client = build_http_client(&config.user_agent, policy.request_timeout)?;
        let storage = Arc::new(Mutex::new(storage));
        let fetcher = ResourceFetcher::new(client, Arc::clone(&storage), policy);

        Ok(Self {
            options: config.fetch,
            config: Arc::new(config),
            storage,
            fetcher,
            stats: Arc::new(CrawlStats::new()),
            config_hash: Arc::from(""),
        })
    }

    /// Sets the configuration hash recorded on crawl runs
    pub fn with_config_hash(mut self, config_hash: &str) -> Self {
        self.config_hash = Arc::from(config_hash);
        self
    }

    pub fn storage(&self) -> Arc<Mutex<SqliteStorage>> {
        Arc::clone(&self.storage)
    }

    pub fn stats(&self) -> Arc<CrawlStats> {
        Arc::clone(&self.stats)
    }

    /// Registers manifest URLs as known manifests
    ///
    /// Already known URLs are left as they are. Every URL is validated before
    /// any is registered.
    pub fn register_manifests<S: AsRef<str>>(&self, urls: &[S]) -> Result<Vec<KnownManifest>> {
        for url in urls {
            validate_manifest_url(url.as_ref())?;
        }

        let mut storage = lock_storage(&self.storage)?;
        let mut registered = Vec::with_capacity(urls.len());
        for url in urls {
            let url = url.as_ref();
            let id = storage.add_known_manifest(url)?;
            registered.push(KnownManifest {
                id,
                url: url.to_string(),
            });
        }
        Ok(registered)
    }

    /// Registers the `[[manifest]]` entries of the configuration
    pub fn register_configured_manifests(&self) -> Result<Vec<KnownManifest>> {
        let urls: Vec<&str> = self
            .config
            .manifests
            .iter()
            .map(|entry| entry.url.as_str())
            .collect();
        self.register_manifests(&urls)
    }

    /// Returns whether a known manifest is due at `now`
    pub fn should_fetch_manifest(&self, manifest: &KnownManifest, now: DateTime<Utc>) -> Result<bool> {
        let last = lock_storage(&self.storage)?.last_manifest_fetch(manifest.id, false)?;
        Ok(scheduler::should_fetch_manifest(
            last.as_ref(),
            now,
            self.config.crawler.default_polling_interval(),
        ))
    }

    /// Computes the polling decision for every known manifest without fetching
    pub fn plan(&self, now: DateTime<Utc>) -> Result<Vec<ManifestPlan>> {
        let storage = lock_storage(&self.storage)?;
        let default_interval = self.config.crawler.default_polling_interval();

        storage
            .load_known_manifests()?
            .into_iter()
            .map(|manifest| -> Result<ManifestPlan> {
                let last = storage.last_manifest_fetch(manifest.id, false)?;
                Ok(ManifestPlan::new(manifest, last, now, default_interval))
            })
            .collect()
    }

    /// Crawls one known manifest and the files it lists
    ///
    /// Fetch and parse failures are recorded and logged, never returned. Only
    /// storage failures escape.
    pub async fn crawl_manifest(
        &self,
        manifest: &KnownManifest,
        now: DateTime<Utc>,
    ) -> Result<ManifestOutcome> {
        let now = to_stored_precision(now);
        tracing::info!("Crawling manifest {}", manifest.url);

        let fetched = match self.fetcher.fetch(&manifest.url, now, &self.options).await {
            Ok(fetched) => fetched,
            Err(e) if e.is_rate_limited() => {
                tracing::debug!("Skipping manifest: {}", e);
                self.stats
                    .record(ResourceKind::Manifest, &manifest.url, FetchOutcome::RateLimited);
                return Ok(ManifestOutcome::RateLimited);
            }
            Err(e @ CrawlerError::FetchFailed { .. }) => {
                tracing::warn!(
                    "Manifest fetch failed (status {}): {}",
                    e.ledger_status(),
                    e
                );
                self.stats
                    .record(ResourceKind::Manifest, &manifest.url, FetchOutcome::Failed);
                let entry = LedgerEntry::failure(&manifest.url, now, e.ledger_status());
                let manifest_fetch_id =
                    lock_storage(&self.storage)?.insert_manifest_fetch(manifest.id, &entry)?;
                return Ok(ManifestOutcome::FetchFailed { manifest_fetch_id });
            }
            Err(e) => return Err(e),
        };

        self.stats
            .record(ResourceKind::Manifest, &manifest.url, fetched.source.into());

        let entry = LedgerEntry::success(
            &manifest.url,
            now,
            fetched.polling_hint_sec,
            fetched.body.clone(),
        );
        let manifest_fetch_id =
            lock_storage(&self.storage)?.insert_manifest_fetch(manifest.id, &entry)?;

        let parsed = match parse_manifest(&manifest.url, &fetched.body) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("{}", e);
                return Ok(ManifestOutcome::Unparseable { manifest_fetch_id });
            }
        };

        tracing::debug!(
            "Manifest {} lists {} files (transaction time {})",
            manifest.url,
            parsed.output_len(),
            parsed.transaction_time
        );

        let mut leaves_recorded = 0;
        for (index, descriptor) in parsed.descriptors().enumerate() {
            let descriptor = match descriptor {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    tracing::warn!(
                        "Skipping malformed output #{} in {}: {}",
                        index,
                        manifest.url,
                        e
                    );
                    self.stats.record_unsupported();
                    continue;
                }
            };

            let Some(kind) = descriptor.file_type.kind() else {
                tracing::info!(
                    "Skipping {} file {} listed in {}",
                    descriptor.file_type,
                    descriptor.url,
                    manifest.url
                );
                self.stats.record_unsupported();
                continue;
            };

            if self
                .crawl_leaf(&manifest.url, manifest_fetch_id, kind, &descriptor, now)
                .await?
            {
                leaves_recorded += 1;
            }
        }

        tracing::info!(
            "Finished manifest {}: {} leaf fetches recorded",
            manifest.url,
            leaves_recorded
        );

        Ok(ManifestOutcome::Crawled {
            manifest_fetch_id,
            leaves_recorded,
        })
    }

    /// Fetches one leaf file and records it
    ///
    /// Returns whether a leaf fetch row was written; rate-limited leaves are
    /// skipped without one.
    async fn crawl_leaf(
        &self,
        manifest_url: &str,
        manifest_fetch_id: i64,
        kind: LeafKind,
        descriptor: &ManifestOutput,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let (jurisdictions, unmatched) = partition_codes(descriptor.state_codes());
        if !unmatched.is_empty() {
            tracing::warn!(
                "Ignoring unknown jurisdiction codes {:?} on {}",
                unmatched,
                descriptor.url
            );
        }

        let entry = match resolve_descriptor_url(manifest_url, &descriptor.url) {
            Ok(url) => match self.fetcher.fetch(&url, now, &self.options).await {
                Ok(fetched) => {
                    self.stats.record(kind.into(), &url, fetched.source.into());
                    LedgerEntry::success(&url, now, fetched.polling_hint_sec, fetched.body)
                }
                Err(e) if e.is_rate_limited() => {
                    tracing::debug!("Skipping {} file: {}", kind, e);
                    self.stats.record(kind.into(), &url, FetchOutcome::RateLimited);
                    return Ok(false);
                }
                Err(e @ CrawlerError::FetchFailed { .. }) => {
                    tracing::warn!("{} fetch failed (status {}): {}", kind, e.ledger_status(), e);
                    self.stats.record(kind.into(), &url, FetchOutcome::Failed);
                    LedgerEntry::failure(&url, now, e.ledger_status())
                }
                Err(e) => return Err(e),
            },
            Err(e) => {
                tracing::warn!(
                    "Unusable {} URL '{}' in {}: {}",
                    kind,
                    descriptor.url,
                    manifest_url,
                    e
                );
                self.stats
                    .record(kind.into(), &descriptor.url, FetchOutcome::Failed);
                LedgerEntry::failure(&descriptor.url, now, 0)
            }
        };

        lock_storage(&self.storage)?.insert_leaf_fetch(
            kind,
            manifest_fetch_id,
            &entry,
            &jurisdictions,
        )?;

        Ok(true)
    }

    /// Runs one crawl pass over every known manifest
    ///
    /// This method:
    /// 1. Registers the configured manifests and opens a crawl run
    /// 2. Crawls every due manifest once, several at a time
    /// 3. Closes the run and returns its summary
    ///
    /// A storage failure in one manifest does not stop the others; the run is
    /// then marked failed and the first such error is returned.
    pub async fn run(&self) -> Result<CrawlSummary> {
        let started_at = to_stored_precision(Utc::now());
        self.stats.start(started_at);

        self.register_configured_manifests()?;
        let run_id = lock_storage(&self.storage)?.create_run(&self.config_hash, started_at)?;
        tracing::info!("Starting crawl run {}", run_id);

        let mut due = Vec::new();
        for plan in self.plan(started_at)? {
            if plan.due {
                due.push(plan.manifest);
            } else {
                tracing::debug!(
                    "Manifest {} not due until {:?}",
                    plan.manifest.url,
                    plan.next_fetch_at
                );
                self.stats.record_not_due();
            }
        }
        tracing::info!("{} manifests due", due.len());

        let mut scheduler = Scheduler::new(self.config.crawler.max_concurrent_manifests, due);
        let mut tasks = JoinSet::new();
        while let Some(ScheduledManifest { manifest, _permit }) = scheduler.next_manifest().await {
            let coordinator = self.clone();
            tasks.spawn(async move {
                let _permit = _permit;
                let result = coordinator.crawl_manifest(&manifest, Utc::now()).await;
                (manifest, result)
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((manifest, Ok(outcome))) => {
                    tracing::debug!("Manifest {}: {:?}", manifest.url, outcome);
                }
                Ok((manifest, Err(e))) => {
                    tracing::error!("Error crawling manifest {}: {}", manifest.url, e);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    tracing::error!("Manifest task failed: {}", e);
                    first_error.get_or_insert(CrawlerError::TaskFailed(e.to_string()));
                }
            }
        }

        self.stats.finish();
        let status = if first_error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        lock_storage(&self.storage)?.finish_run(run_id, Utc::now(), status)?;

        let mut summary = self.stats.snapshot();
        summary.run_id = Some(run_id);
        tracing::info!(
            "Crawl run {} {} in {:.1}s: {}",
            run_id,
            status.to_db_string(),
            summary.duration.as_secs_f64(),
            summary.totals()
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}

/// Runs one crawl pass with the given configuration
///
/// # Example
///
/// ```no_run
/// use availability_crawler::config::load_config_with_hash;
/// use availability_crawler::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("config.toml"))?;
/// let summary = run_crawl(config, &hash).await?;
/// println!("{}", summary);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config, config_hash: &str) -> Result<CrawlSummary> {
    Coordinator::new(config)?
        .with_config_hash(config_hash)
        .run()
        .await
}
