//! `SQLite` key-value store

use rusqlite::{params, Connection, OptionalExtension};

use super::KeyValueStore;
use crate::error::Result;
use crate::util::unix_millis_now;

/// `SQLite` implementation of [`KeyValueStore`] over the `kv_store` table
pub struct SqliteKeyValueStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteKeyValueStore<'a> {
    /// Create a new store with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl KeyValueStore for SqliteKeyValueStore<'_> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)",
            params![key, value, unix_millis_now()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
        Ok(rows > 0)
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        // substr comparison avoids LIKE wildcards inside account ids
        let mut stmt = self.conn.prepare(
            "SELECT key FROM kv_store WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::SyncPreferences;
    use crate::storage::ScopedStore;

    #[test]
    fn test_set_get_remove() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteKeyValueStore::new(db.connection());

        assert_eq!(store.get("missing").unwrap(), None);
        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
        assert!(store.remove("k").unwrap());
        assert!(!store.remove("k").unwrap());
    }

    #[test]
    fn test_keys_by_prefix_ignores_wildcards() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteKeyValueStore::new(db.connection());

        store.set("account:a_1:x", "1").unwrap();
        store.set("account:ab1:x", "1").unwrap();

        assert_eq!(
            store.keys("account:a_1:").unwrap(),
            vec!["account:a_1:x".to_string()]
        );
        assert_eq!(store.keys("").unwrap().len(), 2);
    }

    #[test]
    fn test_corrupted_preferences_reset_to_default() {
        let db = Database::open_in_memory().unwrap();
        let scoped = ScopedStore::new(SqliteKeyValueStore::new(db.connection()), Some("acct"));

        scoped.set("sync_preferences", "not-json").unwrap();
        let prefs: SyncPreferences = scoped.get_json_or_default("sync_preferences").unwrap();

        assert_eq!(prefs, SyncPreferences::default());
        assert_eq!(scoped.get("sync_preferences").unwrap(), None);
    }
}
