//! Freshness and rate-limit decisions for a single URL
//!
//! Nothing here is stored: the state of a URL is re-derived from its cache
//! entry and last fetch attempt every time the fetcher looks at it.

use crate::config::FetchOptions;
use crate::storage::{CacheEntry, FetchAttempt};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Where a URL stands with respect to the resource cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Never successfully fetched
    Unknown,
    /// Cached and servable without a network call
    CachedFresh,
    /// Cached but past its expiry; must be revalidated
    CachedStale,
}

impl ResourceState {
    pub fn classify(entry: Option<&CacheEntry>, now: DateTime<Utc>) -> Self {
        match entry {
            None => Self::Unknown,
            Some(entry) if entry.is_fresh(now) => Self::CachedFresh,
            Some(_) => Self::CachedStale,
        }
    }
}

/// What the fetcher should do for a URL right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDecision {
    /// Return the cached body, no network call
    ServeCached,
    /// The last attempt is inside the rate-limit window
    RateLimited {
        elapsed_secs: i64,
        retry_after: DateTime<Utc>,
    },
    /// Issue a (possibly conditional) GET
    Revalidate,
}

/// Decides how to serve a fetch
///
/// # Arguments
///
/// * `entry` - The current cache entry for the URL, if any
/// * `last_attempt` - The most recent network attempt on the URL, if any
/// * `now` - The logical time of the fetch
/// * `window` - Minimum interval between two network attempts
/// * `options` - Per-call switches
///
/// # Returns
///
/// `ServeCached` when the cache is consulted and fresh, `RateLimited` when the
/// last attempt is too recent, `Revalidate` otherwise.
pub fn decide(
    entry: Option<&CacheEntry>,
    last_attempt: Option<&FetchAttempt>,
    now: DateTime<Utc>,
    window: Duration,
    options: &FetchOptions,
) -> FetchDecision {
    if !options.skip_cache && ResourceState::classify(entry, now) == ResourceState::CachedFresh {
        return FetchDecision::ServeCached;
    }

    if options.ignore_rate_limiting {
        return FetchDecision::Revalidate;
    }

    let Some(last) = last_attempt else {
        return FetchDecision::Revalidate;
    };

    // Compared at full precision; whole-second rounding would shorten the window
    let elapsed = now.signed_duration_since(last.fetch_at);
    let window = chrono::Duration::from_std(window).ok();
    let inside_window = window.map_or(true, |w| elapsed < w);
    if inside_window {
        let retry_after = window
            .and_then(|w| last.fetch_at.checked_add_signed(w))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        return FetchDecision::RateLimited {
            elapsed_secs: elapsed.num_seconds(),
            retry_after,
        };
    }

    FetchDecision::Revalidate
}

/// Freshness information carried by a 200 or 304 response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseFreshness {
    /// `Cache-Control: max-age`, in seconds
    pub max_age: Option<u64>,
    /// Parsed `Expires` header
    pub expires: Option<DateTime<Utc>>,
}

impl ResponseFreshness {
    /// Reads freshness from raw `Cache-Control` and `Expires` header values
    ///
    /// An unparseable `Expires` is ignored.
    pub fn from_headers(cache_control: Option<&str>, expires: Option<&str>) -> Self {
        Self {
            max_age: cache_control.and_then(parse_max_age),
            expires: expires.and_then(parse_http_date),
        }
    }

    /// Computes the expiry of a response fetched at `fetch_at`
    ///
    /// `max-age` wins over `Expires`, which wins over `default_expiration`. The
    /// result is never earlier than `fetch_at`.
    pub fn expires_at(
        &self,
        fetch_at: DateTime<Utc>,
        default_expiration: Duration,
    ) -> DateTime<Utc> {
        let computed = if let Some(max_age) = self.max_age {
            add_secs(fetch_at, Duration::from_secs(max_age))
        } else if let Some(expires) = self.expires {
            expires
        } else {
            add_secs(fetch_at, default_expiration)
        };

        computed.max(fetch_at)
    }

    /// The polling hint to record with the fetch
    pub fn polling_hint_sec(&self) -> Option<u64> {
        self.max_age
    }
}

fn add_secs(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Extracts `max-age=N` from a `Cache-Control` header value
pub fn parse_max_age(cache_control: &str) -> Option<u64> {
    cache_control.split(',').find_map(|directive| {
        let (name, value) = directive.trim().split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("max-age") {
            return None;
        }
        value.trim().trim_matches('"').parse().ok()
    })
}

/// Parses an HTTP-date such as `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Formats a timestamp as an HTTP-date for `If-Modified-Since`
pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
