//! SQLite-backed store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{CacheEntry, RevalidationStore, StoreError};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// File-backed store; validators survive restarts.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the store at the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database. Mostly useful in tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute_batch(include_str!("../../migrations/000001_validators.up.sql"))
            .map_err(|e| StoreError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RevalidationStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT validator, last_modified, payload, retrieved_at FROM validators WHERE resource_key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((validator, last_modified, payload, time_str)) = row else {
            return Ok(None);
        };

        let retrieved_at = parse_db_time(&time_str).ok_or_else(|| StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("unparseable retrieved_at {:?}", time_str),
        })?;

        Ok(Some(CacheEntry {
            validator,
            last_modified,
            payload,
            retrieved_at,
        }))
    }

    fn put(&self, key: &str, entry: CacheEntry) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO validators (resource_key, validator, last_modified, payload, retrieved_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(resource_key) DO UPDATE SET
             validator=excluded.validator, last_modified=excluded.last_modified,
             payload=excluded.payload, retrieved_at=excluded.retrieved_at",
            params![
                key,
                entry.validator,
                entry.last_modified,
                entry.payload,
                entry.retrieved_at.format(TIME_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    fn put_if_newer(&self, key: &str, entry: CacheEntry) -> Result<bool, StoreError> {
        let conn = self.conn();
        let changed = conn.execute(
            "INSERT INTO validators (resource_key, validator, last_modified, payload, retrieved_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(resource_key) DO UPDATE SET
             validator=excluded.validator, last_modified=excluded.last_modified,
             payload=excluded.payload, retrieved_at=excluded.retrieved_at
             WHERE validators.validator IS NOT excluded.validator
                OR excluded.retrieved_at > validators.retrieved_at",
            params![
                key,
                entry.validator,
                entry.last_modified,
                entry.payload,
                entry.retrieved_at.format(TIME_FORMAT).to_string(),
            ],
        )?;
        Ok(changed > 0)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute("DELETE FROM validators WHERE resource_key = ?1", params![key])?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT resource_key FROM validators ORDER BY resource_key ASC")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<SqlResult<Vec<String>>>()?;
        Ok(keys)
    }
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_entry_roundtrip_survives_reopen() {
        let tmp = NamedTempFile::new().unwrap();

        let mut entry = CacheEntry::new(r#"{"segment_colors":{}}"#, Some("W/\"42\"".to_string()));
        entry.last_modified = Some("Wed, 01 May 2024 10:00:00 GMT".to_string());
        {
            let store = SqliteStore::new(tmp.path()).unwrap();
            store.put("segments", entry.clone()).unwrap();
        }

        let reopened = SqliteStore::new(tmp.path()).unwrap();
        let fetched = reopened.get("segments").unwrap().unwrap();
        assert_eq!(fetched, entry);
        assert!(reopened.get("lines").unwrap().is_none());
    }

    #[test]
    fn test_put_if_newer() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = CacheEntry::new("one", Some("v1".to_string()));
        assert!(store.put_if_newer("segments", first.clone()).unwrap());
        assert!(!store.put_if_newer("segments", first.clone()).unwrap());

        let mut stale = first.clone();
        stale.payload = "stale".to_string();
        stale.retrieved_at = first.retrieved_at - Duration::seconds(30);
        assert!(!store.put_if_newer("segments", stale).unwrap());

        let mut later = first.clone();
        later.payload = "later".to_string();
        later.retrieved_at = first.retrieved_at + Duration::seconds(30);
        assert!(store.put_if_newer("segments", later).unwrap());
        assert_eq!(store.get("segments").unwrap().unwrap().payload, "later");

        // A missing validator on either side still counts as "differs".
        let untagged = CacheEntry::new("untagged", None);
        assert!(store.put_if_newer("segments", untagged).unwrap());
        assert_eq!(store.get("segments").unwrap().unwrap().validator, None);
    }

    #[test]
    fn test_keys_and_remove() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("segments", CacheEntry::new("a", None)).unwrap();
        store.put("lines", CacheEntry::new("b", None)).unwrap();
        assert_eq!(store.keys().unwrap(), vec!["lines".to_string(), "segments".to_string()]);

        store.remove("lines").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["segments".to_string()]);
    }

    #[test]
    fn test_parse_db_time() {
        assert!(parse_db_time("2024-05-01 10:00:00.123456789").is_some());
        assert!(parse_db_time("2024-05-01T10:00:00Z").is_some());
        assert!(parse_db_time("yesterday").is_none());
    }
}
