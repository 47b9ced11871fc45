//! Offline queue service over the local database.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{Database, OfflineQueueRepository, SqliteOfflineQueueRepository};
use crate::models::{
    OfflineDataItem, OfflineItemId, OfflinePayload, OfflineStats, SyncPreferences, SyncStatus,
    SYNC_PREFERENCES_KEY,
};
use crate::storage::{ScopedStore, SqliteKeyValueStore};
use crate::{Error, Result};

/// Thread-safe handle to the offline queue and the account-scoped cache.
///
/// The lock is only held for the duration of one local operation, never across
/// a remote call.
#[derive(Clone)]
pub struct OfflineService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl OfflineService {
    /// Open the queue database at the given filesystem path.
    ///
    /// A file that is not a `SQLite` database is moved aside and a fresh queue
    /// is created in its place.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path) {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local queue at {} is unreadable: {}. Moving it aside.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path)?
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory queue (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: Arc::new(Mutex::new(Database::open_in_memory()?)),
            db_path: None,
        })
    }

    /// Location of the database file, `None` when in memory
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn is_corrupted_db_error(error: &crate::Error) -> bool {
        let message = error.to_string().to_ascii_lowercase();
        message.contains("file is not a database") || message.contains("malformed")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let base_name = db_path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("omran.db");
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));
            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local queue from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        // WAL sidecars belong to the old file
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = db_path.as_os_str().to_owned();
            sidecar.push(suffix);
            let sidecar = PathBuf::from(sidecar);
            if sidecar.exists() {
                std::fs::remove_file(&sidecar)?;
            }
        }
        Ok(())
    }

    /// Queue owner as stored: trimmed, never blank
    fn owner(user_id: &str) -> Result<&str> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(Error::InvalidInput("user id cannot be empty".to_string()));
        }
        Ok(user_id)
    }

    /// Validate `payload` and queue it as pending for `user_id`.
    ///
    /// Saving the same `(user, data type, data id)` again replaces the content
    /// and resets the row to pending.
    pub async fn save_offline_data(
        &self,
        user_id: &str,
        payload: &OfflinePayload,
    ) -> Result<OfflineDataItem> {
        let user_id = Self::owner(user_id)?;
        payload.validate()?;
        let item = {
            let db = self.db.lock().await;
            SqliteOfflineQueueRepository::new(db.connection()).upsert(user_id, payload)?
        };
        tracing::debug!(
            user_id = %item.user_id,
            data_type = %item.data_type,
            data_id = %item.data_id,
            "Queued offline mutation"
        );
        Ok(item)
    }

    /// Queue counts by status.
    pub async fn get_offline_stats(&self, user_id: &str) -> Result<OfflineStats> {
        let user_id = Self::owner(user_id)?;
        let db = self.db.lock().await;
        SqliteOfflineQueueRepository::new(db.connection()).stats(user_id)
    }

    /// Queue rows oldest first, optionally filtered by status.
    pub async fn list_items(
        &self,
        user_id: &str,
        status: Option<SyncStatus>,
    ) -> Result<Vec<OfflineDataItem>> {
        let user_id = Self::owner(user_id)?;
        let db = self.db.lock().await;
        SqliteOfflineQueueRepository::new(db.connection()).list(user_id, status)
    }

    pub async fn pending_items(&self, user_id: &str) -> Result<Vec<OfflineDataItem>> {
        self.list_items(user_id, Some(SyncStatus::Pending)).await
    }

    /// Mark a pushed item synced.
    ///
    /// Returns `false` when the row was re-saved after `item` was read; it then
    /// stays pending for the next run.
    pub async fn mark_synced(&self, item: &OfflineDataItem, synced_at: i64) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteOfflineQueueRepository::new(db.connection()).mark_synced(
            &item.id,
            item.updated_at,
            synced_at,
        )
    }

    pub async fn mark_error(&self, id: &OfflineItemId, message: &str) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteOfflineQueueRepository::new(db.connection()).mark_error(id, message)
    }

    /// Delete synced rows of the user.
    pub async fn cleanup_synced(&self, user_id: &str) -> Result<usize> {
        let user_id = Self::owner(user_id)?;
        let removed = {
            let db = self.db.lock().await;
            SqliteOfflineQueueRepository::new(db.connection()).cleanup_synced(user_id)?
        };
        tracing::info!(user_id, removed, "Cleaned up synced queue rows");
        Ok(removed)
    }

    /// Move failed rows back to pending.
    pub async fn retry_failed(&self, user_id: &str) -> Result<usize> {
        let user_id = Self::owner(user_id)?;
        let requeued = {
            let db = self.db.lock().await;
            SqliteOfflineQueueRepository::new(db.connection()).requeue_failed(user_id)?
        };
        tracing::info!(user_id, requeued, "Requeued failed queue rows");
        Ok(requeued)
    }

    /// Cached sync preferences of an account (global when `None`).
    ///
    /// Corrupted cache entries are dropped and the defaults returned.
    pub async fn load_preferences(&self, account_id: Option<&str>) -> Result<SyncPreferences> {
        Ok(self
            .stored_preferences(account_id)
            .await?
            .unwrap_or_default())
    }

    /// Preferences explicitly saved for an account, `None` when never saved
    pub async fn stored_preferences(
        &self,
        account_id: Option<&str>,
    ) -> Result<Option<SyncPreferences>> {
        let db = self.db.lock().await;
        let store = ScopedStore::new(SqliteKeyValueStore::new(db.connection()), account_id);
        store.get_json_or_discard(SYNC_PREFERENCES_KEY)
    }

    pub async fn save_preferences(
        &self,
        account_id: Option<&str>,
        preferences: &SyncPreferences,
    ) -> Result<()> {
        preferences.validate()?;
        let db = self.db.lock().await;
        let store = ScopedStore::new(SqliteKeyValueStore::new(db.connection()), account_id);
        store.set_json(SYNC_PREFERENCES_KEY, preferences)
    }

    /// Remove every corrupted cache entry of an account, returning the keys.
    pub async fn repair_storage(&self, account_id: Option<&str>) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        ScopedStore::new(SqliteKeyValueStore::new(db.connection()), account_id).repair()
    }

    /// Drop every cached entry of an account, returning the count.
    pub async fn clear_storage(&self, account_id: Option<&str>) -> Result<usize> {
        let cleared = {
            let db = self.db.lock().await;
            ScopedStore::new(SqliteKeyValueStore::new(db.connection()), account_id).clear()?
        };
        tracing::info!(account_id, cleared, "Cleared cached entries");
        Ok(cleared)
    }

    /// Write a raw cache value (used to restore entries and by tests).
    pub async fn set_raw(&self, account_id: Option<&str>, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock().await;
        ScopedStore::new(SqliteKeyValueStore::new(db.connection()), account_id).set(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConflictPreference, DataType};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    fn product(id: &str, price: f64) -> OfflinePayload {
        OfflinePayload::from_parts(
            DataType::Product,
            id,
            json!({"name": "Tea", "price": price, "stock_quantity": 4}),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn save_is_idempotent_on_key() {
        let service = OfflineService::open_in_memory().unwrap();
        let first = service
            .save_offline_data("user-1", &product("p-1", 2.5))
            .await
            .unwrap();
        let second = service
            .save_offline_data("user-1", &product("p-1", 3.0))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.updated_at > first.updated_at);
        let stats = service.get_offline_stats("user-1").await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn user_id_is_trimmed_for_every_operation() {
        let service = OfflineService::open_in_memory().unwrap();
        service
            .save_offline_data(" u ", &product("p-1", 2.5))
            .await
            .unwrap();

        assert_eq!(service.get_offline_stats(" u ").await.unwrap().pending, 1);
        assert_eq!(service.get_offline_stats("u").await.unwrap().pending, 1);
        assert_eq!(service.pending_items("u ").await.unwrap().len(), 1);
        assert_eq!(service.retry_failed(" u").await.unwrap(), 0);
        assert!(matches!(
            service.get_offline_stats("   ").await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn invalid_payload_is_not_queued() {
        let service = OfflineService::open_in_memory().unwrap();
        let payload = OfflinePayload::Product(crate::models::ProductPayload {
            id: "p-2".to_string(),
            name: "  ".to_string(),
            sku: None,
            price: 1.0,
            stock_quantity: 0,
        });

        let error = service
            .save_offline_data("user-1", &payload)
            .await
            .unwrap_err();
        assert!(matches!(error, crate::Error::InvalidInput(_)));
        assert_eq!(service.get_offline_stats("user-1").await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn error_rows_return_to_pending_only_on_retry() {
        let service = OfflineService::open_in_memory().unwrap();
        let item = service
            .save_offline_data("user-1", &product("p-1", 2.5))
            .await
            .unwrap();
        assert!(service.mark_error(&item.id, "rejected").await.unwrap());
        assert!(service.pending_items("user-1").await.unwrap().is_empty());

        assert_eq!(service.retry_failed("user-1").await.unwrap(), 1);
        let pending = service.pending_items("user-1").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].last_error, None);
    }

    #[tokio::test]
    async fn resaved_item_stays_pending_after_stale_mark() {
        let service = OfflineService::open_in_memory().unwrap();
        let pushed = service
            .save_offline_data("user-1", &product("p-1", 2.5))
            .await
            .unwrap();
        service
            .save_offline_data("user-1", &product("p-1", 4.0))
            .await
            .unwrap();

        assert!(!service.mark_synced(&pushed, 1_000).await.unwrap());
        assert_eq!(service.get_offline_stats("user-1").await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn preferences_are_scoped_by_account() {
        let service = OfflineService::open_in_memory().unwrap();
        let preferences = SyncPreferences {
            auto_sync: false,
            sync_interval_minutes: 30,
            conflict_preference: ConflictPreference::PreferCashFlow,
        };
        service
            .save_preferences(Some("acct-1"), &preferences)
            .await
            .unwrap();

        assert_eq!(
            service.load_preferences(Some("acct-1")).await.unwrap(),
            preferences
        );
        assert_eq!(
            service.load_preferences(Some("acct-2")).await.unwrap(),
            SyncPreferences::default()
        );
    }

    #[tokio::test]
    async fn stored_preferences_distinguish_unsaved_accounts() {
        let service = OfflineService::open_in_memory().unwrap();
        assert_eq!(service.stored_preferences(Some("acct-1")).await.unwrap(), None);

        let zero_interval = SyncPreferences {
            sync_interval_minutes: 0,
            ..SyncPreferences::default()
        };
        assert!(service
            .save_preferences(Some("acct-1"), &zero_interval)
            .await
            .is_err());

        service
            .save_preferences(Some("acct-1"), &SyncPreferences::default())
            .await
            .unwrap();
        assert_eq!(
            service.stored_preferences(Some("acct-1")).await.unwrap(),
            Some(SyncPreferences::default())
        );
    }

    #[tokio::test]
    async fn clear_storage_only_touches_one_account() {
        let service = OfflineService::open_in_memory().unwrap();
        service
            .set_raw(Some("acct-1"), "theme", "\"dark\"")
            .await
            .unwrap();
        service
            .save_preferences(Some("acct-1"), &SyncPreferences::default())
            .await
            .unwrap();
        service
            .set_raw(Some("acct-2"), "theme", "\"light\"")
            .await
            .unwrap();

        assert_eq!(service.clear_storage(Some("acct-1")).await.unwrap(), 2);
        assert_eq!(service.stored_preferences(Some("acct-1")).await.unwrap(), None);
        assert_eq!(service.clear_storage(Some("acct-2")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn corrupted_preferences_fall_back_to_defaults() {
        let service = OfflineService::open_in_memory().unwrap();
        service
            .set_raw(Some("acct-1"), SYNC_PREFERENCES_KEY, "{not json")
            .await
            .unwrap();

        assert_eq!(
            service.load_preferences(Some("acct-1")).await.unwrap(),
            SyncPreferences::default()
        );
        // The corrupted entry is gone, so repair finds nothing left
        assert!(service.repair_storage(Some("acct-1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repair_reports_removed_keys() {
        let service = OfflineService::open_in_memory().unwrap();
        service
            .set_raw(Some("acct-1"), "session_flags", "{\"ok\":")
            .await
            .unwrap();
        service
            .set_raw(Some("acct-1"), "theme", "\"dark\"")
            .await
            .unwrap();

        assert_eq!(
            service.repair_storage(Some("acct-1")).await.unwrap(),
            vec!["session_flags".to_string()]
        );
    }

    #[test]
    fn unreadable_file_is_moved_aside() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("queue.db");
        std::fs::write(&path, vec![b'x'; 4096]).unwrap();

        let service = OfflineService::open_path(&path).unwrap();
        assert_eq!(service.db_path(), Some(path.as_path()));

        let moved = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(std::result::Result::ok)
            .any(|entry| entry.file_name().to_string_lossy().contains(".corrupt-"));
        assert!(moved);
    }

    #[tokio::test]
    async fn file_queue_survives_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("queue.db");
        {
            let service = OfflineService::open_path(&path).unwrap();
            service
                .save_offline_data("user-1", &product("p-1", 1.0))
                .await
                .unwrap();
        }
        let service = OfflineService::open_path(&path).unwrap();
        assert_eq!(service.get_offline_stats("user-1").await.unwrap().pending, 1);
    }
}
