//! Account-scoped key-value storage.
//!
//! Cached settings and session flags are kept in a flat key-value store. The
//! active account is passed explicitly through [`ScopedStore`]; keys of an
//! account are stored as `account:<id>:<key>`, global keys unprefixed.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteKeyValueStore;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Prefix of account-scoped keys
const ACCOUNT_PREFIX: &str = "account:";

/// Flat string key-value storage
pub trait KeyValueStore {
    /// Read a raw value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a raw value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key, returning whether it existed
    fn remove(&self, key: &str) -> Result<bool>;

    /// List keys starting with `prefix`
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &S {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<bool> {
        (**self).remove(key)
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).keys(prefix)
    }
}

/// View of a [`KeyValueStore`] for one account (or the global namespace)
pub struct ScopedStore<S> {
    inner: S,
    account_id: Option<String>,
}

impl<S: KeyValueStore> ScopedStore<S> {
    /// Scope `inner` to `account_id`; `None` or a blank id selects the global namespace
    pub fn new(inner: S, account_id: Option<&str>) -> Self {
        let account_id = account_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ToString::to_string);
        Self { inner, account_id }
    }

    /// Scope `inner` to the global namespace
    pub const fn global(inner: S) -> Self {
        Self {
            inner,
            account_id: None,
        }
    }

    /// Active account of this scope
    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    fn prefix(&self) -> String {
        self.account_id
            .as_ref()
            .map_or_else(String::new, |id| format!("{ACCOUNT_PREFIX}{id}:"))
    }

    fn physical_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix())
    }

    /// Read a raw value
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(&self.physical_key(key))
    }

    /// Write a raw value
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set(&self.physical_key(key), value)
    }

    /// Remove a key
    pub fn remove(&self, key: &str) -> Result<bool> {
        self.inner.remove(&self.physical_key(key))
    }

    /// Keys visible in this scope, without the account prefix
    pub fn keys(&self) -> Result<Vec<String>> {
        let prefix = self.prefix();
        let keys = self.inner.keys(&prefix)?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(ToString::to_string))
            // The global scope must not list other accounts' keys
            .filter(|key| !(prefix.is_empty() && key.starts_with(ACCOUNT_PREFIX)))
            .collect())
    }

    /// Decode a JSON value.
    ///
    /// Returns `Ok(None)` for a missing key and `Error::StorageCorruption`
    /// when the stored text is not valid JSON for `T`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.get(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|error| Error::StorageCorruption {
                key: key.to_string(),
                reason: error.to_string(),
            })
    }

    /// Encode and store a JSON value
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }

    /// Decode a JSON value, treating a corrupted entry as missing.
    ///
    /// The corrupted entry is removed; the error is logged, not propagated.
    pub fn get_json_or_discard<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_json(key) {
            Ok(value) => Ok(value),
            Err(Error::StorageCorruption { key, reason }) => {
                tracing::warn!(
                    "Discarding corrupted storage entry '{key}' for account {:?}: {reason}",
                    self.account_id
                );
                self.remove(&key)?;
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Decode a JSON value, falling back to `T::default()` when it is missing
    /// or corrupted.
    pub fn get_json_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        Ok(self.get_json_or_discard(key)?.unwrap_or_default())
    }

    /// Remove every entry of this scope that is not valid JSON.
    ///
    /// Returns the removed keys.
    pub fn repair(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for key in self.keys()? {
            let Some(raw) = self.get(&key)? else {
                continue;
            };
            if serde_json::from_str::<serde_json::Value>(&raw).is_err() {
                self.remove(&key)?;
                tracing::warn!("Removed corrupted storage entry '{key}'");
                removed.push(key);
            }
        }
        Ok(removed)
    }

    /// Remove every entry of this scope, returning the count
    pub fn clear(&self) -> Result<usize> {
        let mut count = 0;
        for key in self.keys()? {
            if self.remove(&key)? {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConflictPreference, SyncPreferences, SYNC_PREFERENCES_KEY};
    use pretty_assertions::assert_eq;

    #[test]
    fn scoped_keys_are_prefixed_by_account() {
        let store = MemoryStore::default();
        let scoped = ScopedStore::new(&store, Some("acct-1"));

        scoped.set("theme_cache", "\"dark\"").unwrap();

        assert_eq!(
            store.get("account:acct-1:theme_cache").unwrap().as_deref(),
            Some("\"dark\"")
        );
        assert_eq!(scoped.keys().unwrap(), vec!["theme_cache".to_string()]);
    }

    #[test]
    fn accounts_do_not_see_each_other() {
        let store = MemoryStore::default();
        let first = ScopedStore::new(&store, Some("acct-1"));
        let second = ScopedStore::new(&store, Some("acct-2"));
        let global = ScopedStore::global(&store);

        first.set("flag", "true").unwrap();
        global.set("active_account_id", "\"acct-1\"").unwrap();

        assert_eq!(second.get("flag").unwrap(), None);
        assert!(second.keys().unwrap().is_empty());
        assert_eq!(global.keys().unwrap(), vec!["active_account_id".to_string()]);
    }

    #[test]
    fn blank_account_is_global() {
        let store = MemoryStore::default();
        let scoped = ScopedStore::new(&store, Some("  "));
        assert_eq!(scoped.account_id(), None);
    }

    #[test]
    fn corrupted_json_falls_back_to_default_and_removes_key() {
        let store = MemoryStore::default();
        let scoped = ScopedStore::new(&store, Some("acct-1"));
        scoped.set(SYNC_PREFERENCES_KEY, "{\"auto_sync\": tru").unwrap();

        let prefs: SyncPreferences = scoped.get_json_or_default(SYNC_PREFERENCES_KEY).unwrap();

        assert_eq!(prefs, SyncPreferences::default());
        assert_eq!(scoped.get(SYNC_PREFERENCES_KEY).unwrap(), None);
    }

    #[test]
    fn json_roundtrip_through_scope() {
        let store = MemoryStore::default();
        let scoped = ScopedStore::new(&store, Some("acct-1"));
        let prefs = SyncPreferences {
            auto_sync: false,
            sync_interval_minutes: 5,
            conflict_preference: ConflictPreference::PreferCashFlow,
        };

        scoped.set_json(SYNC_PREFERENCES_KEY, &prefs).unwrap();
        let loaded: SyncPreferences = scoped.get_json_or_default(SYNC_PREFERENCES_KEY).unwrap();
        assert_eq!(loaded, prefs);
    }

    #[test]
    fn repair_removes_only_invalid_entries() {
        let store = MemoryStore::default();
        let scoped = ScopedStore::new(&store, Some("acct-1"));
        let other = ScopedStore::new(&store, Some("acct-2"));

        scoped.set("good", "{\"a\":1}").unwrap();
        scoped.set("bad", "{oops").unwrap();
        other.set("bad", "{oops").unwrap();

        let removed = scoped.repair().unwrap();

        assert_eq!(removed, vec!["bad".to_string()]);
        assert!(scoped.get("good").unwrap().is_some());
        assert!(other.get("bad").unwrap().is_some());
    }

    #[test]
    fn clear_only_touches_scope() {
        let store = MemoryStore::default();
        let scoped = ScopedStore::new(&store, Some("acct-1"));
        let global = ScopedStore::global(&store);

        scoped.set("a", "1").unwrap();
        scoped.set("b", "2").unwrap();
        global.set("c", "3").unwrap();

        assert_eq!(scoped.clear().unwrap(), 2);
        assert_eq!(global.get("c").unwrap().as_deref(), Some("3"));
    }
}
