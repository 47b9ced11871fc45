//! Offline queue item model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::payload::{DataType, OfflinePayload};

/// A unique identifier for a queue row, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OfflineItemId(Uuid);

impl OfflineItemId {
    /// Create a new unique queue row ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for OfflineItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OfflineItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OfflineItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Sync status of a queue row
///
/// The sync runner only moves `Pending` to `Synced` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Waiting to be pushed
    Pending,
    /// Pushed to the remote store
    Synced,
    /// The last push failed
    Error,
}

impl SyncStatus {
    /// Column value stored in the queue table
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "error" | "failed" => Ok(Self::Error),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown sync status '{other}'"
            ))),
        }
    }
}

/// A pending local mutation persisted in the offline queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineDataItem {
    /// Unique identifier
    pub id: OfflineItemId,
    /// Owner of the mutation
    pub user_id: String,
    /// Target data type
    pub data_type: DataType,
    /// Natural key of the record inside its data type
    pub data_id: String,
    /// Validated payload
    pub data_content: OfflinePayload,
    /// Current sync status
    pub sync_status: SyncStatus,
    /// Message of the last failed push
    pub last_error: Option<String>,
    /// Time of the successful push (Unix ms)
    pub last_sync_at: Option<i64>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last local mutation timestamp (Unix ms)
    pub updated_at: i64,
}

/// Queue counts for one user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineStats {
    pub total: usize,
    pub pending: usize,
    pub synced: usize,
    pub error: usize,
}

impl OfflineStats {
    /// Add one row with the given status
    pub fn record(&mut self, status: SyncStatus, count: usize) {
        match status {
            SyncStatus::Pending => self.pending += count,
            SyncStatus::Synced => self.synced += count,
            SyncStatus::Error => self.error += count,
        }
        self.total += count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_unique() {
        assert_ne!(OfflineItemId::new(), OfflineItemId::new());
    }

    #[test]
    fn test_item_id_parse() {
        let id = OfflineItemId::new();
        let parsed: OfflineItemId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_sync_status_parse() {
        assert_eq!("pending".parse::<SyncStatus>().unwrap(), SyncStatus::Pending);
        assert_eq!(" Synced ".parse::<SyncStatus>().unwrap(), SyncStatus::Synced);
        assert_eq!("failed".parse::<SyncStatus>().unwrap(), SyncStatus::Error);
        assert!("done".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_stats_record() {
        let mut stats = OfflineStats::default();
        stats.record(SyncStatus::Pending, 2);
        stats.record(SyncStatus::Error, 1);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.error, 1);
        assert_eq!(stats.synced, 0);
    }
}
