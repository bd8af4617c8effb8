use rusqlite::{Connection, OptionalExtension};
#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::Mutex;

use super::error::StoreError;

/// Raw stored text plus the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    pub raw: String,
    pub version: i64,
}

/// Whole-value key/value persistence. Callers own (de)serialization.
pub trait RosterStore {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError>;

    fn set(&self, key: &str, raw: &str) -> Result<(), StoreError>;

    /// Writes only if the key is still at `expected` (`None` = absent).
    /// Returns `false` when another writer got there first.
    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<i64>,
        raw: &str,
    ) -> Result<bool, StoreError>;
}

impl<T: RosterStore + ?Sized> RosterStore for &T {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, raw: &str) -> Result<(), StoreError> {
        (**self).set(key, raw)
    }

    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<i64>,
        raw: &str,
    ) -> Result<bool, StoreError> {
        (**self).compare_and_set(key, expected, raw)
    }
}

/// `kv_store` table in the workspace database.
pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl RosterStore for SqliteStore<'_> {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT value, version FROM kv_store WHERE key = ?",
                [key],
                |r| {
                    Ok(StoredValue {
                        raw: r.get(0)?,
                        version: r.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn set(&self, key: &str, raw: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO kv_store(key, value, version, updated_at)
             VALUES(?, ?, 1, strftime('%Y-%m-%dT%H:%M:%SZ','now'))
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               version = kv_store.version + 1,
               updated_at = excluded.updated_at",
            (key, raw),
        )?;
        Ok(())
    }

    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<i64>,
        raw: &str,
    ) -> Result<bool, StoreError> {
        let changed = match expected {
            None => self.conn.execute(
                "INSERT OR IGNORE INTO kv_store(key, value, version, updated_at)
                 VALUES(?, ?, 1, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
                (key, raw),
            )?,
            Some(version) => self.conn.execute(
                "UPDATE kv_store
                 SET value = ?,
                     version = version + 1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
                 WHERE key = ? AND version = ?",
                (raw, key, version),
            )?,
        };
        Ok(changed == 1)
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl RosterStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, raw: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let version = entries.get(key).map(|v| v.version + 1).unwrap_or(1);
        entries.insert(
            key.to_string(),
            StoredValue {
                raw: raw.to_string(),
                version,
            },
        );
        Ok(())
    }

    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<i64>,
        raw: &str,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let current = entries.get(key).map(|v| v.version);
        if current != expected {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            StoredValue {
                raw: raw.to_string(),
                version: current.map(|v| v + 1).unwrap_or(1),
            },
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_store_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        crate::db::create_schema(&conn).expect("schema");
        conn
    }

    fn exercise_cas(store: &dyn RosterStore) {
        assert_eq!(store.get("classLists").expect("get"), None);
        assert!(store
            .compare_and_set("classLists", None, "{}")
            .expect("first insert"));
        // A second "absent" insert lost the race.
        assert!(!store
            .compare_and_set("classLists", None, "{\"x\":[]}")
            .expect("stale insert"));

        let v1 = store.get("classLists").expect("get").expect("present");
        assert_eq!(v1.raw, "{}");
        assert!(store
            .compare_and_set("classLists", Some(v1.version), "{\"A\":[]}")
            .expect("cas"));
        assert!(!store
            .compare_and_set("classLists", Some(v1.version), "{\"B\":[]}")
            .expect("stale cas"));

        store.set("classLists", "{\"C\":[]}").expect("set");
        let v3 = store.get("classLists").expect("get").expect("present");
        assert_eq!(v3.raw, "{\"C\":[]}");
        assert_eq!(v3.version, v1.version + 2);
    }

    #[test]
    fn memory_store_versions_every_write() {
        exercise_cas(&MemoryStore::new());
    }

    #[test]
    fn sqlite_store_versions_every_write() {
        let conn = sqlite_store_conn();
        exercise_cas(&SqliteStore::new(&conn));
    }
}
