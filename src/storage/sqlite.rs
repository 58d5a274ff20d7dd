//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::{Jurisdiction, LeafKind};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    from_unix, to_unix, CacheEntry, CacheWrite, FetchAttempt, KnownManifest, LeafFetchRecord,
    LedgerEntry, ManifestFetchRecord, RunRecord, RunStatus, STATUS_OK,
};
use crate::CrawlerError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(CrawlerError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, CrawlerError> {
        let conn = Connection::open(path)?;

        // WAL plus a busy timeout lets other processes share the file
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, CrawlerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Columns shared by manifest and leaf fetch rows, before timestamp conversion
struct RawFetchRow {
    id: i64,
    url: String,
    parent_id: i64,
    read_sec: f64,
    status_code: i64,
    polling_hint_sec: Option<i64>,
    contents: Option<String>,
}

impl RawFetchRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            url: row.get(1)?,
            parent_id: row.get(2)?,
            read_sec: row.get(3)?,
            status_code: row.get(4)?,
            polling_hint_sec: row.get(5)?,
            contents: row.get(6)?,
        })
    }

    fn into_manifest_fetch(self) -> StorageResult<ManifestFetchRecord> {
        Ok(ManifestFetchRecord {
            id: self.id,
            url: self.url,
            known_manifest_id: self.parent_id,
            read_at: timestamp(self.read_sec)?,
            status_code: status(self.status_code)?,
            polling_hint_sec: self.polling_hint_sec.map(|h| h.max(0) as u64),
            contents: self.contents,
        })
    }

    fn into_leaf_fetch(self, kind: LeafKind) -> StorageResult<LeafFetchRecord> {
        Ok(LeafFetchRecord {
            id: self.id,
            kind,
            url: self.url,
            manifest_fetch_id: self.parent_id,
            read_at: timestamp(self.read_sec)?,
            status_code: status(self.status_code)?,
            polling_hint_sec: self.polling_hint_sec.map(|h| h.max(0) as u64),
            contents: self.contents,
        })
    }
}

fn timestamp(secs: f64) -> StorageResult<DateTime<Utc>> {
    from_unix(secs).ok_or(StorageError::InvalidTimestamp(secs))
}

fn status(code: i64) -> StorageResult<u16> {
    u16::try_from(code).map_err(|_| StorageError::Database(format!("Invalid status code {}", code)))
}

fn hint_to_sql(hint: Option<u64>) -> Option<i64> {
    hint.map(|h| i64::try_from(h).unwrap_or(i64::MAX))
}

fn count(conn: &Connection, sql: &str) -> StorageResult<u64> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(n as u64)
}

impl Storage for SqliteStorage {
    // ===== Known Manifests =====

    fn add_known_manifest(&mut self, url: &str) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT OR IGNORE INTO known_manifests (url) VALUES (?1)",
            params![url],
        )?;

        let id = self.conn.query_row(
            "SELECT known_manifest_id FROM known_manifests WHERE url = ?1",
            params![url],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn load_known_manifests(&self) -> StorageResult<Vec<KnownManifest>> {
        let mut stmt = self
            .conn
            .prepare("SELECT known_manifest_id, url FROM known_manifests ORDER BY known_manifest_id")?;

        let manifests = stmt
            .query_map([], |row| {
                Ok(KnownManifest {
                    id: row.get(0)?,
                    url: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(manifests)
    }

    fn get_known_manifest(&self, id: i64) -> StorageResult<KnownManifest> {
        self.conn
            .query_row(
                "SELECT known_manifest_id, url FROM known_manifests WHERE known_manifest_id = ?1",
                params![id],
                |row| {
                    Ok(KnownManifest {
                        id: row.get(0)?,
                        url: row.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or(StorageError::ManifestNotFound(id))
    }

    // ===== Resource Cache =====

    fn get_cache_entry(&self, url: &str) -> StorageResult<Option<CacheEntry>> {
        let raw = self
            .conn
            .query_row(
                "SELECT url, fetch_sec, expires_at_sec, etag, data FROM resource_cache WHERE url = ?1",
                params![url],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((url, fetch_sec, expires_sec, etag, data)) = raw else {
            return Ok(None);
        };

        Ok(Some(CacheEntry {
            url,
            fetch_at: timestamp(fetch_sec)?,
            expires_at: timestamp(expires_sec)?,
            etag,
            data,
        }))
    }

    // ===== Fetch Attempt Log =====

    fn last_fetch_attempt(&self, url: &str) -> StorageResult<Option<FetchAttempt>> {
        let raw = self
            .conn
            .query_row(
                "SELECT fetch_sec, status_code FROM fetch_attempts
                 WHERE url = ?1 ORDER BY fetch_sec DESC, fetch_attempt_id DESC LIMIT 1",
                params![url],
                |row| Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        let Some((fetch_sec, status_code)) = raw else {
            return Ok(None);
        };

        Ok(Some(FetchAttempt {
            url: url.to_string(),
            fetch_at: timestamp(fetch_sec)?,
            status_code: status(status_code)?,
        }))
    }

    fn get_fetch_attempts(&self, url: &str) -> StorageResult<Vec<FetchAttempt>> {
        let mut stmt = self.conn.prepare(
            "SELECT fetch_sec, status_code FROM fetch_attempts
             WHERE url = ?1 ORDER BY fetch_sec, fetch_attempt_id",
        )?;

        let rows = stmt
            .query_map(params![url], |row| {
                Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(fetch_sec, status_code)| {
                Ok(FetchAttempt {
                    url: url.to_string(),
                    fetch_at: timestamp(fetch_sec)?,
                    status_code: status(status_code)?,
                })
            })
            .collect()
    }

    fn commit_fetch(&mut self, attempt: &FetchAttempt, write: &CacheWrite) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO fetch_attempts (url, fetch_sec, status_code) VALUES (?1, ?2, ?3)",
            params![attempt.url, to_unix(attempt.fetch_at), attempt.status_code],
        )?;

        match write {
            CacheWrite::None => {}
            CacheWrite::Replace(entry) => {
                tx.execute(
                    "INSERT INTO resource_cache (url, fetch_sec, expires_at_sec, etag, data)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(url) DO UPDATE SET
                        fetch_sec = excluded.fetch_sec,
                        expires_at_sec = excluded.expires_at_sec,
                        etag = excluded.etag,
                        data = excluded.data",
                    params![
                        entry.url,
                        to_unix(entry.fetch_at),
                        to_unix(entry.expires_at),
                        entry.etag,
                        entry.data
                    ],
                )?;
            }
            CacheWrite::Refresh {
                fetch_at,
                expires_at,
                etag,
            } => {
                let updated = tx.execute(
                    "UPDATE resource_cache
                     SET fetch_sec = ?1, expires_at_sec = ?2, etag = COALESCE(?3, etag)
                     WHERE url = ?4",
                    params![to_unix(*fetch_at), to_unix(*expires_at), etag, attempt.url],
                )?;
                if updated == 0 {
                    return Err(StorageError::CacheEntryNotFound(attempt.url.clone()));
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    // ===== Crawl Ledger =====

    fn insert_manifest_fetch(
        &mut self,
        known_manifest_id: i64,
        entry: &LedgerEntry,
    ) -> StorageResult<i64> {
        // Surface a clear error instead of a bare foreign key failure
        self.get_known_manifest(known_manifest_id)?;

        self.conn.execute(
            "INSERT INTO manifest_fetches
             (url, known_manifest_id, read_sec, fetch_status_code, polling_hint_sec, contents)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.url,
                known_manifest_id,
                to_unix(entry.read_at),
                entry.status_code,
                hint_to_sql(entry.polling_hint_sec),
                entry.contents
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn last_manifest_fetch(
        &self,
        known_manifest_id: i64,
        only_success: bool,
    ) -> StorageResult<Option<ManifestFetchRecord>> {
        let raw = if only_success {
            self.conn
                .query_row(
                    "SELECT manifest_fetch_id, url, known_manifest_id, read_sec, fetch_status_code,
                            polling_hint_sec, contents
                     FROM manifest_fetches
                     WHERE known_manifest_id = ?1 AND fetch_status_code = ?2
                     ORDER BY read_sec DESC, manifest_fetch_id DESC LIMIT 1",
                    params![known_manifest_id, STATUS_OK],
                    RawFetchRow::from_row,
                )
                .optional()?
        } else {
            self.conn
                .query_row(
                    "SELECT manifest_fetch_id, url, known_manifest_id, read_sec, fetch_status_code,
                            polling_hint_sec, contents
                     FROM manifest_fetches
                     WHERE known_manifest_id = ?1
                     ORDER BY read_sec DESC, manifest_fetch_id DESC LIMIT 1",
                    params![known_manifest_id],
                    RawFetchRow::from_row,
                )
                .optional()?
        };

        raw.map(RawFetchRow::into_manifest_fetch).transpose()
    }

    fn get_manifest_fetch(&self, id: i64) -> StorageResult<ManifestFetchRecord> {
        let raw = self
            .conn
            .query_row(
                "SELECT manifest_fetch_id, url, known_manifest_id, read_sec, fetch_status_code,
                        polling_hint_sec, contents
                 FROM manifest_fetches WHERE manifest_fetch_id = ?1",
                params![id],
                RawFetchRow::from_row,
            )
            .optional()?
            .ok_or(StorageError::ManifestFetchNotFound(id))?;

        raw.into_manifest_fetch()
    }

    fn insert_leaf_fetch(
        &mut self,
        kind: LeafKind,
        manifest_fetch_id: i64,
        entry: &LedgerEntry,
        jurisdictions: &[Jurisdiction],
    ) -> StorageResult<i64> {
        let tx = self.conn.transaction()?;

        let parent_exists: Option<i64> = tx
            .query_row(
                "SELECT manifest_fetch_id FROM manifest_fetches WHERE manifest_fetch_id = ?1",
                params![manifest_fetch_id],
                |row| row.get(0),
            )
            .optional()?;
        if parent_exists.is_none() {
            return Err(StorageError::ManifestFetchNotFound(manifest_fetch_id));
        }

        tx.execute(
            &format!(
                "INSERT INTO {}
                 (url, manifest_fetch_id, read_sec, fetch_status_code, polling_hint_sec, contents)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                kind.fetch_table()
            ),
            params![
                entry.url,
                manifest_fetch_id,
                to_unix(entry.read_at),
                entry.status_code,
                hint_to_sql(entry.polling_hint_sec),
                entry.contents
            ],
        )?;
        let leaf_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR IGNORE INTO {} ({}, state_id) VALUES (?1, ?2)",
                kind.state_table(),
                kind.state_fk_column()
            ))?;
            for jurisdiction in jurisdictions {
                stmt.execute(params![leaf_id, jurisdiction.id()])?;
            }
        }

        tx.commit()?;
        Ok(leaf_id)
    }

    fn get_leaf_fetches(
        &self,
        kind: LeafKind,
        manifest_fetch_id: i64,
    ) -> StorageResult<Vec<LeafFetchRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {}, url, manifest_fetch_id, read_sec, fetch_status_code,
                    polling_hint_sec, contents
             FROM {} WHERE manifest_fetch_id = ?1 ORDER BY 1",
            kind.state_fk_column(),
            kind.fetch_table()
        ))?;

        let rows = stmt
            .query_map(params![manifest_fetch_id], RawFetchRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|raw| raw.into_leaf_fetch(kind))
            .collect()
    }

    fn get_leaf_jurisdictions(
        &self,
        kind: LeafKind,
        leaf_fetch_id: i64,
    ) -> StorageResult<Vec<Jurisdiction>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT state_id FROM {} WHERE {} = ?1 ORDER BY state_id",
            kind.state_table(),
            kind.state_fk_column()
        ))?;

        let ids = stmt
            .query_map(params![leaf_fetch_id], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        ids.into_iter()
            .map(|id| {
                Jurisdiction::from_id(id)
                    .ok_or_else(|| StorageError::Database(format!("Unknown state id {}", id)))
            })
            .collect()
    }

    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str, started_at: DateTime<Utc>) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO crawl_runs (started_sec, config_hash, status) VALUES (?1, ?2, ?3)",
            params![
                to_unix(started_at),
                config_hash,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        finished_at: DateTime<Utc>,
        status: RunStatus,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE crawl_runs SET status = ?1, finished_sec = ?2 WHERE id = ?3",
            params![status.to_db_string(), to_unix(finished_at), run_id],
        )?;
        Ok(())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, started_sec, finished_sec, config_hash, status
                 FROM crawl_runs ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, started_sec, finished_sec, config_hash, status)) = raw else {
            return Ok(None);
        };

        Ok(Some(RunRecord {
            id,
            started_at: timestamp(started_sec)?,
            finished_at: finished_sec.map(timestamp).transpose()?,
            config_hash,
            status: RunStatus::from_db_string(&status).unwrap_or(RunStatus::Running),
        }))
    }

    // ===== Statistics =====

    fn count_known_manifests(&self) -> StorageResult<u64> {
        count(&self.conn, "SELECT COUNT(*) FROM known_manifests")
    }

    fn count_fetch_attempts(&self) -> StorageResult<u64> {
        count(&self.conn, "SELECT COUNT(*) FROM fetch_attempts")
    }

    fn count_cache_entries(&self) -> StorageResult<u64> {
        count(&self.conn, "SELECT COUNT(*) FROM resource_cache")
    }

    fn count_manifest_fetches(&self, only_success: bool) -> StorageResult<u64> {
        if only_success {
            count(
                &self.conn,
                "SELECT COUNT(*) FROM manifest_fetches WHERE contents IS NOT NULL",
            )
        } else {
            count(&self.conn, "SELECT COUNT(*) FROM manifest_fetches")
        }
    }

    fn count_leaf_fetches(&self, kind: LeafKind, only_success: bool) -> StorageResult<u64> {
        let filter = if only_success {
            " WHERE contents IS NOT NULL"
        } else {
            ""
        };
        count(
            &self.conn,
            &format!("SELECT COUNT(*) FROM {}{}", kind.fetch_table(), filter),
        )
    }

    fn count_jurisdiction_tags(&self) -> StorageResult<Vec<(Jurisdiction, u64)>> {
        let query = "
            SELECT state_id, COUNT(*) FROM (
                SELECT state_id FROM location_fetch_states
                UNION ALL SELECT state_id FROM schedule_fetch_states
                UNION ALL SELECT state_id FROM slot_fetch_states
            )
            GROUP BY state_id
            ORDER BY state_id
        ";

        let mut stmt = self.conn.prepare(query)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, n)| Jurisdiction::from_id(id).map(|j| (j, n as u64)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn cache_entry(url: &str, fetch: i64, expires: i64, data: &str) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            fetch_at: at(fetch),
            expires_at: at(expires),
            etag: Some("\"v1\"".to_string()),
            data: data.to_string(),
        }
    }

    fn attempt(url: &str, fetch: i64, status_code: u16) -> FetchAttempt {
        FetchAttempt {
            url: url.to_string(),
            fetch_at: at(fetch),
            status_code,
        }
    }

    const URL: &str = "https://example.com/locations.ndjson";

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_on_disk_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawler.db");

        {
            let mut storage = SqliteStorage::new(&path).unwrap();
            storage.add_known_manifest("https://example.com/m").unwrap();
        }

        let storage = SqliteStorage::new(&path).unwrap();
        assert_eq!(storage.count_known_manifests().unwrap(), 1);
    }

    #[test]
    fn test_add_known_manifest_is_idempotent() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let id1 = storage.add_known_manifest("https://example.com/m").unwrap();
        let id2 = storage.add_known_manifest("https://example.com/m").unwrap();
        let id3 = storage.add_known_manifest("https://example.org/m").unwrap();

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
        assert_eq!(storage.load_known_manifests().unwrap().len(), 2);
        assert_eq!(
            storage.get_known_manifest(id3).unwrap().url,
            "https://example.org/m"
        );
        assert!(matches!(
            storage.get_known_manifest(999),
            Err(StorageError::ManifestNotFound(999))
        ));
    }

    #[test]
    fn test_commit_fetch_replace_and_refresh() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        storage
            .commit_fetch(
                &attempt(URL, 100, 200),
                &CacheWrite::Replace(cache_entry(URL, 100, 160, "body-1")),
            )
            .unwrap();
        assert_eq!(storage.get_cache_entry(URL).unwrap().unwrap().data, "body-1");

        storage
            .commit_fetch(
                &attempt(URL, 200, 304),
                &CacheWrite::Refresh {
                    fetch_at: at(200),
                    expires_at: at(260),
                    etag: None,
                },
            )
            .unwrap();

        let refreshed = storage.get_cache_entry(URL).unwrap().unwrap();
        assert_eq!(refreshed.data, "body-1");
        assert_eq!(refreshed.fetch_at, at(200));
        assert_eq!(refreshed.expires_at, at(260));
        assert_eq!(refreshed.etag.as_deref(), Some("\"v1\""));

        storage
            .commit_fetch(
                &attempt(URL, 300, 200),
                &CacheWrite::Replace(cache_entry(URL, 300, 400, "body-2")),
            )
            .unwrap();
        assert_eq!(storage.get_cache_entry(URL).unwrap().unwrap().data, "body-2");
        assert_eq!(storage.count_cache_entries().unwrap(), 1);
        assert_eq!(storage.get_fetch_attempts(URL).unwrap().len(), 3);
    }

    #[test]
    fn test_refresh_without_entry_rolls_back_attempt() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        let result = storage.commit_fetch(
            &attempt(URL, 100, 304),
            &CacheWrite::Refresh {
                fetch_at: at(100),
                expires_at: at(200),
                etag: None,
            },
        );

        assert!(matches!(result, Err(StorageError::CacheEntryNotFound(_))));
        assert!(storage.last_fetch_attempt(URL).unwrap().is_none());
    }

    #[test]
    fn test_last_fetch_attempt() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.last_fetch_attempt(URL).unwrap().is_none());

        storage
            .commit_fetch(&attempt(URL, 100, 0), &CacheWrite::None)
            .unwrap();
        storage
            .commit_fetch(&attempt(URL, 250, 503), &CacheWrite::None)
            .unwrap();

        let last = storage.last_fetch_attempt(URL).unwrap().unwrap();
        assert_eq!(last.fetch_at, at(250));
        assert_eq!(last.status_code, 503);
        assert!(storage.get_cache_entry(URL).unwrap().is_none());
    }

    #[test]
    fn test_manifest_fetch_ledger() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let km = storage.add_known_manifest("https://example.com/m").unwrap();

        let ok = LedgerEntry::success("https://example.com/m", at(100), Some(300), "{}".into());
        let ok_id = storage.insert_manifest_fetch(km, &ok).unwrap();

        let failed = LedgerEntry::failure("https://example.com/m", at(500), 503);
        let failed_id = storage.insert_manifest_fetch(km, &failed).unwrap();

        let last = storage.last_manifest_fetch(km, false).unwrap().unwrap();
        assert_eq!(last.id, failed_id);
        assert!(!last.is_success());
        assert!(last.contents.is_none());

        let last_ok = storage.last_manifest_fetch(km, true).unwrap().unwrap();
        assert_eq!(last_ok.id, ok_id);
        assert_eq!(last_ok.polling_hint_sec, Some(300));
        assert_eq!(storage.get_manifest_fetch(ok_id).unwrap(), last_ok);

        assert_eq!(storage.count_manifest_fetches(false).unwrap(), 2);
        assert_eq!(storage.count_manifest_fetches(true).unwrap(), 1);
    }

    #[test]
    fn test_manifest_fetch_requires_known_manifest() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let entry = LedgerEntry::failure("https://example.com/m", at(1), 0);
        assert!(matches!(
            storage.insert_manifest_fetch(42, &entry),
            Err(StorageError::ManifestNotFound(42))
        ));
    }

    #[test]
    fn test_leaf_fetch_with_jurisdictions() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let km = storage.add_known_manifest("https://example.com/m").unwrap();
        let mf = storage
            .insert_manifest_fetch(
                km,
                &LedgerEntry::success("https://example.com/m", at(100), None, "{}".into()),
            )
            .unwrap();

        let ma = Jurisdiction::from_code("MA").unwrap();
        let ny = Jurisdiction::from_code("NY").unwrap();
        let entry = LedgerEntry::success(URL, at(101), Some(60), "{\"id\":1}".into());
        let leaf = storage
            .insert_leaf_fetch(LeafKind::Location, mf, &entry, &[ma, ny, ma])
            .unwrap();

        let failed = LedgerEntry::failure("https://example.com/slots", at(102), 0);
        storage
            .insert_leaf_fetch(LeafKind::Slot, mf, &failed, &[])
            .unwrap();

        let locations = storage.get_leaf_fetches(LeafKind::Location, mf).unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].id, leaf);
        assert_eq!(locations[0].polling_hint_sec, Some(60));
        assert_eq!(
            storage
                .get_leaf_jurisdictions(LeafKind::Location, leaf)
                .unwrap(),
            vec![ma, ny]
        );

        let slots = storage.get_leaf_fetches(LeafKind::Slot, mf).unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].status_code, 0);
        assert!(slots[0].contents.is_none());

        assert_eq!(storage.count_leaf_fetches(LeafKind::Slot, false).unwrap(), 1);
        assert_eq!(storage.count_leaf_fetches(LeafKind::Slot, true).unwrap(), 0);
        assert_eq!(storage.count_jurisdiction_tags().unwrap(), vec![(ma, 1), (ny, 1)]);
    }

    #[test]
    fn test_leaf_fetch_requires_manifest_fetch() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let entry = LedgerEntry::failure(URL, at(1), 404);
        let result = storage.insert_leaf_fetch(LeafKind::Schedule, 7, &entry, &[]);
        assert!(matches!(result, Err(StorageError::ManifestFetchNotFound(7))));
        assert_eq!(storage.count_leaf_fetches(LeafKind::Schedule, false).unwrap(), 0);
    }

    #[test]
    fn test_run_lifecycle() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.get_latest_run().unwrap().is_none());

        let run_id = storage.create_run("test_hash", at(10)).unwrap();
        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());

        storage
            .finish_run(run_id, at(20), RunStatus::Completed)
            .unwrap();
        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.finished_at, Some(at(20)));
        assert_eq!(run.config_hash, "test_hash");
    }
}
