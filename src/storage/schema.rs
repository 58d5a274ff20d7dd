//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the crawler database.
//! Timestamps are stored as fractional unix seconds (microsecond precision).

use crate::state::Jurisdiction;
use rusqlite::params;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Operator-configured root manifests
CREATE TABLE IF NOT EXISTS known_manifests (
    known_manifest_id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE
);

-- Every network attempt, used for rate limiting
CREATE TABLE IF NOT EXISTS fetch_attempts (
    fetch_attempt_id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    fetch_sec REAL NOT NULL,
    status_code INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fetch_attempts_url ON fetch_attempts(url, fetch_sec);

-- Current cached copy of each resource
CREATE TABLE IF NOT EXISTS resource_cache (
    resource_cache_id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    fetch_sec REAL NOT NULL,
    expires_at_sec REAL NOT NULL,
    etag TEXT,
    data TEXT NOT NULL,
    CHECK (expires_at_sec >= fetch_sec)
);

-- One row per crawl pass over a known manifest
CREATE TABLE IF NOT EXISTS manifest_fetches (
    manifest_fetch_id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    known_manifest_id INTEGER NOT NULL REFERENCES known_manifests(known_manifest_id),
    read_sec REAL NOT NULL,
    fetch_status_code INTEGER NOT NULL,
    polling_hint_sec INTEGER,
    contents TEXT
);

CREATE INDEX IF NOT EXISTS idx_manifest_fetches_known
    ON manifest_fetches(known_manifest_id, read_sec);

-- Leaf fetches, one table per file type
CREATE TABLE IF NOT EXISTS location_fetches (
    location_fetch_id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    manifest_fetch_id INTEGER NOT NULL REFERENCES manifest_fetches(manifest_fetch_id),
    read_sec REAL NOT NULL,
    fetch_status_code INTEGER NOT NULL,
    polling_hint_sec INTEGER,
    contents TEXT
);

CREATE TABLE IF NOT EXISTS schedule_fetches (
    schedule_fetch_id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    manifest_fetch_id INTEGER NOT NULL REFERENCES manifest_fetches(manifest_fetch_id),
    read_sec REAL NOT NULL,
    fetch_status_code INTEGER NOT NULL,
    polling_hint_sec INTEGER,
    contents TEXT
);

CREATE TABLE IF NOT EXISTS slot_fetches (
    slot_fetch_id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    manifest_fetch_id INTEGER NOT NULL REFERENCES manifest_fetches(manifest_fetch_id),
    read_sec REAL NOT NULL,
    fetch_status_code INTEGER NOT NULL,
    polling_hint_sec INTEGER,
    contents TEXT
);

CREATE INDEX IF NOT EXISTS idx_location_fetches_manifest ON location_fetches(manifest_fetch_id);
CREATE INDEX IF NOT EXISTS idx_schedule_fetches_manifest ON schedule_fetches(manifest_fetch_id);
CREATE INDEX IF NOT EXISTS idx_slot_fetches_manifest ON slot_fetches(manifest_fetch_id);

-- Fixed jurisdiction table, seeded at startup
CREATE TABLE IF NOT EXISTS states (
    state_id INTEGER PRIMARY KEY,
    code TEXT NOT NULL UNIQUE
);

-- Jurisdiction tags on leaf fetches
CREATE TABLE IF NOT EXISTS location_fetch_states (
    location_fetch_id INTEGER NOT NULL REFERENCES location_fetches(location_fetch_id),
    state_id INTEGER NOT NULL REFERENCES states(state_id),
    UNIQUE(location_fetch_id, state_id)
);

CREATE TABLE IF NOT EXISTS schedule_fetch_states (
    schedule_fetch_id INTEGER NOT NULL REFERENCES schedule_fetches(schedule_fetch_id),
    state_id INTEGER NOT NULL REFERENCES states(state_id),
    UNIQUE(schedule_fetch_id, state_id)
);

CREATE TABLE IF NOT EXISTS slot_fetch_states (
    slot_fetch_id INTEGER NOT NULL REFERENCES slot_fetches(slot_fetch_id),
    state_id INTEGER NOT NULL REFERENCES states(state_id),
    UNIQUE(slot_fetch_id, state_id)
);

-- Track crawl runs
CREATE TABLE IF NOT EXISTS crawl_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_sec REAL NOT NULL,
    finished_sec REAL,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);
"#;

/// Initializes the database schema and seeds the `states` table
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    seed_states(conn)?;
    Ok(())
}

fn seed_states(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    let mut stmt = conn.prepare("INSERT OR IGNORE INTO states (state_id, code) VALUES (?1, ?2)")?;
    for jurisdiction in Jurisdiction::all() {
        stmt.execute(params![jurisdiction.id(), jurisdiction.code()])?;
    }
    Ok(())
}
