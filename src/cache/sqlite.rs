//! Cache table in the shared SQLite database
//!
//! Lets the CLI reuse a harvest's cached lists across invocations. Expiry
//! is wall-clock based here since entries outlive the process.

use super::{CacheEntryInfo, CacheResult, ResultCache};
use crate::storage::open_connection;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct SqliteCache {
    path: PathBuf,
}

impl SqliteCache {
    pub fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(crate::storage::StorageError::from)?;
            }
        }
        let conn = open_connection(&path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                stored_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                ttl_secs INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self { path })
    }

    fn connect(&self) -> CacheResult<Connection> {
        Ok(open_connection(&self.path)?)
    }
}

fn parse(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl ResultCache for SqliteCache {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let conn = self.connect()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT payload, expires_at FROM cache_entries WHERE key = ?1",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((payload, expires_at)) if parse(&expires_at) > Utc::now() => Ok(Some(payload)),
            Some((_, expires_at)) => {
                // Only the stale row; a concurrent put may have replaced it.
                conn.execute(
                    "DELETE FROM cache_entries WHERE key = ?1 AND expires_at = ?2",
                    params![key, expires_at],
                )?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, payload: String, ttl: Duration) -> CacheResult<()> {
        let conn = self.connect()?;
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        conn.execute(
            r#"
            INSERT INTO cache_entries (key, payload, stored_at, expires_at, ttl_secs)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                stored_at = excluded.stored_at,
                expires_at = excluded.expires_at,
                ttl_secs = excluded.ttl_secs
            "#,
            params![key, payload, now.to_rfc3339(), expires_at.to_rfc3339(), ttl.as_secs() as i64],
        )?;
        Ok(())
    }

    fn invalidate(&self, key: &str) -> CacheResult<bool> {
        let conn = self.connect()?;
        let removed = conn.execute("DELETE FROM cache_entries WHERE key = ?1", [key])?;
        Ok(removed > 0)
    }

    fn list_entries(&self, prefix: Option<&str>) -> CacheResult<Vec<CacheEntryInfo>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT key, stored_at, expires_at, ttl_secs, length(payload) FROM cache_entries \
             WHERE ?1 IS NULL OR substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let now = Utc::now();
        let rows = stmt
            .query_map([prefix], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .map(|(key, stored_at, expires_at, ttl_secs, size)| {
                let expires_at = parse(&expires_at);
                let remaining = (expires_at - now).num_seconds().max(0) as u64;
                CacheEntryInfo {
                    key,
                    stored_at: parse(&stored_at),
                    ttl_secs: ttl_secs.max(0) as u64,
                    expires_in_secs: remaining,
                    expired: expires_at <= now,
                    size_bytes: size.max(0) as usize,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_cache() -> (tempfile::TempDir, SqliteCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteCache::open(dir.path().join("capitol.db")).unwrap();
        (dir, cache)
    }

    #[test]
    fn put_get_invalidate() {
        let (_dir, cache) = create_test_cache();
        cache.put("events:NV", "[]".to_string(), Duration::from_secs(600)).unwrap();
        assert_eq!(cache.get("events:NV").unwrap().as_deref(), Some("[]"));
        cache.put("events:NV", "[1]".to_string(), Duration::from_secs(600)).unwrap();
        assert_eq!(cache.get("events:NV").unwrap().as_deref(), Some("[1]"));
        assert!(cache.invalidate("events:NV").unwrap());
        assert!(cache.get("events:NV").unwrap().is_none());
        assert!(!cache.invalidate("events:NV").unwrap());
    }

    #[test]
    fn zero_ttl_entries_are_never_served() {
        let (_dir, cache) = create_test_cache();
        cache.put("events:NC", "[]".to_string(), Duration::ZERO).unwrap();
        assert!(cache.get("events:NC").unwrap().is_none());
        assert!(cache.list_entries(None).unwrap().is_empty());
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capitol.db");
        SqliteCache::open(&path)
            .unwrap()
            .put("events:TX", "[]".to_string(), Duration::from_secs(600))
            .unwrap();
        let reopened = SqliteCache::open(&path).unwrap();
        assert!(reopened.get("events:TX").unwrap().is_some());
    }

    #[test]
    fn list_entries_by_prefix() {
        let (_dir, cache) = create_test_cache();
        cache.put("events:NV", "[]".to_string(), Duration::from_secs(600)).unwrap();
        cache.put("events:NC", "[1]".to_string(), Duration::from_secs(600)).unwrap();
        cache.put("bills:NV", "[]".to_string(), Duration::from_secs(600)).unwrap();

        let listed = cache.list_entries(Some("events:")).unwrap();
        let keys: Vec<_> = listed.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["events:NC", "events:NV"]);
        assert_eq!(listed[0].size_bytes, 3);
        assert_eq!(listed[0].ttl_secs, 600);
        assert!(!listed[0].expired);
        assert!(listed[0].expires_in_secs > 590);
    }

    #[test]
    fn cache_table_coexists_with_event_store() {
        use crate::storage::{EventStore, OpenStore, SqliteStore};
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capitol.db");
        let store = SqliteStore::open(&path).unwrap();
        let cache = SqliteCache::open(&path).unwrap();
        cache.put("events:NV", "[]".to_string(), Duration::from_secs(60)).unwrap();
        assert_eq!(store.event_count(None).unwrap(), 0);
        assert!(cache.get("events:NV").unwrap().is_some());
    }
}
