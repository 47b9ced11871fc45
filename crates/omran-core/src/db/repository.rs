//! Offline queue repository implementation

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // SQLite COUNT is i64

use crate::error::{Error, Result};
use crate::models::{
    DataType, OfflineDataItem, OfflineItemId, OfflinePayload, OfflineStats, SyncStatus,
};
use crate::util::unix_millis_now;
use rusqlite::{params, Connection, OptionalExtension};

const ITEM_COLUMNS: &str = "id, user_id, data_type, data_id, data_content, sync_status,
    last_error, last_sync_at, created_at, updated_at";

/// Trait for offline queue storage operations
pub trait OfflineQueueRepository {
    /// Insert or replace the pending mutation for `(user, type, id)`
    fn upsert(&self, user_id: &str, payload: &OfflinePayload) -> Result<OfflineDataItem>;

    /// Get the queue row for a natural key
    fn get(&self, user_id: &str, data_type: DataType, data_id: &str)
        -> Result<Option<OfflineDataItem>>;

    /// List queue rows for a user, oldest first, optionally filtered by status
    fn list(&self, user_id: &str, status: Option<SyncStatus>) -> Result<Vec<OfflineDataItem>>;

    /// Mark a pending row synced, provided it was not re-saved since `seen_updated_at`
    fn mark_synced(&self, id: &OfflineItemId, seen_updated_at: i64, synced_at: i64)
        -> Result<bool>;

    /// Mark a pending row failed with the error message
    fn mark_error(&self, id: &OfflineItemId, message: &str) -> Result<bool>;

    /// Count rows by status
    fn stats(&self, user_id: &str) -> Result<OfflineStats>;

    /// Delete synced rows
    fn cleanup_synced(&self, user_id: &str) -> Result<usize>;

    /// Move failed rows back to pending
    fn requeue_failed(&self, user_id: &str) -> Result<usize>;
}

/// `SQLite` implementation of `OfflineQueueRepository`
pub struct SqliteOfflineQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteOfflineQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a queue row; column order follows `ITEM_COLUMNS`
    fn parse_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawItem> {
        Ok(RawItem {
            id: row.get(0)?,
            user_id: row.get(1)?,
            data_type: row.get(2)?,
            data_id: row.get(3)?,
            data_content: row.get(4)?,
            sync_status: row.get(5)?,
            last_error: row.get(6)?,
            last_sync_at: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

/// Row as stored, before the text columns are decoded
struct RawItem {
    id: String,
    user_id: String,
    data_type: String,
    data_id: String,
    data_content: String,
    sync_status: String,
    last_error: Option<String>,
    last_sync_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<RawItem> for OfflineDataItem {
    type Error = Error;

    fn try_from(raw: RawItem) -> Result<Self> {
        let corrupted = |reason: String| Error::StorageCorruption {
            key: format!("offline_data/{}", raw.id),
            reason,
        };

        let id = raw
            .id
            .parse::<OfflineItemId>()
            .map_err(|error| corrupted(error.to_string()))?;
        let data_type = raw.data_type.parse::<DataType>()?;
        let data_content = serde_json::from_str::<OfflinePayload>(&raw.data_content)
            .map_err(|error| corrupted(error.to_string()))?;
        if data_content.data_type() != data_type {
            return Err(corrupted(format!(
                "payload is {} but row is {data_type}",
                data_content.data_type()
            )));
        }

        Ok(Self {
            id,
            user_id: raw.user_id,
            data_type,
            data_id: raw.data_id,
            data_content,
            sync_status: raw.sync_status.parse()?,
            last_error: raw.last_error,
            last_sync_at: raw.last_sync_at,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
        })
    }
}

impl OfflineQueueRepository for SqliteOfflineQueueRepository<'_> {
    fn upsert(&self, user_id: &str, payload: &OfflinePayload) -> Result<OfflineDataItem> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(Error::InvalidInput("user id cannot be empty".to_string()));
        }

        let now = unix_millis_now();
        let content = serde_json::to_string(payload)?;
        let data_type = payload.data_type();

        // updated_at must strictly increase so mark_synced can detect a re-save
        self.conn.execute(
            "INSERT INTO offline_data
                (id, user_id, data_type, data_id, data_content, sync_status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?6)
             ON CONFLICT (user_id, data_type, data_id) DO UPDATE SET
                data_content = excluded.data_content,
                sync_status = 'pending',
                last_error = NULL,
                updated_at = MAX(excluded.updated_at, offline_data.updated_at + 1)",
            params![
                OfflineItemId::new().as_str(),
                user_id,
                data_type.as_str(),
                payload.data_id(),
                content,
                now
            ],
        )?;

        self.get(user_id, data_type, payload.data_id())?
            .ok_or_else(|| Error::NotFound(format!("{data_type}/{}", payload.data_id())))
    }

    fn get(
        &self,
        user_id: &str,
        data_type: DataType,
        data_id: &str,
    ) -> Result<Option<OfflineDataItem>> {
        let raw = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM offline_data
                     WHERE user_id = ? AND data_type = ? AND data_id = ?"
                ),
                params![user_id, data_type.as_str(), data_id],
                Self::parse_item,
            )
            .optional()?;

        raw.map(OfflineDataItem::try_from).transpose()
    }

    fn list(&self, user_id: &str, status: Option<SyncStatus>) -> Result<Vec<OfflineDataItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM offline_data
             WHERE user_id = ?1 AND (?2 IS NULL OR sync_status = ?2)
             ORDER BY created_at ASC, id ASC"
        ))?;

        let rows = stmt
            .query_map(
                params![user_id, status.map(SyncStatus::as_str)],
                Self::parse_item,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut items = Vec::with_capacity(rows.len());
        for raw in rows {
            match OfflineDataItem::try_from(raw) {
                Ok(item) => items.push(item),
                // One undecodable row must not hide the rest of the queue
                Err(error) => tracing::warn!("Skipping unreadable queue row: {error}"),
            }
        }
        Ok(items)
    }

    fn mark_synced(
        &self,
        id: &OfflineItemId,
        seen_updated_at: i64,
        synced_at: i64,
    ) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE offline_data
             SET sync_status = 'synced', last_sync_at = ?1, last_error = NULL
             WHERE id = ?2 AND sync_status = 'pending' AND updated_at = ?3",
            params![synced_at, id.as_str(), seen_updated_at],
        )?;
        Ok(rows > 0)
    }

    fn mark_error(&self, id: &OfflineItemId, message: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE offline_data
             SET sync_status = 'error', last_error = ?1
             WHERE id = ?2 AND sync_status = 'pending'",
            params![message, id.as_str()],
        )?;
        Ok(rows > 0)
    }

    fn stats(&self, user_id: &str) -> Result<OfflineStats> {
        let mut stmt = self.conn.prepare(
            "SELECT sync_status, COUNT(*) FROM offline_data
             WHERE user_id = ?
             GROUP BY sync_status",
        )?;

        let counts = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stats = OfflineStats::default();
        for (status, count) in counts {
            stats.record(status.parse()?, count as usize);
        }
        Ok(stats)
    }

    fn cleanup_synced(&self, user_id: &str) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM offline_data WHERE user_id = ? AND sync_status = 'synced'",
            params![user_id],
        )?;
        Ok(rows)
    }

    fn requeue_failed(&self, user_id: &str) -> Result<usize> {
        let rows = self.conn.execute(
            "UPDATE offline_data
             SET sync_status = 'pending', last_error = NULL,
                 updated_at = MAX(?2, updated_at + 1)
             WHERE user_id = ?1 AND sync_status = 'error'",
            params![user_id, unix_millis_now()],
        )?;
        Ok(rows)
    }
}
