//! Cached sync preferences

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::conflict::ConflictPreference;

/// Storage key the preferences are cached under
pub const SYNC_PREFERENCES_KEY: &str = "sync_preferences";

/// Per-account sync preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncPreferences {
    /// Whether the periodic sync loop runs
    pub auto_sync: bool,
    /// Interval of the periodic sync loop in minutes
    pub sync_interval_minutes: u32,
    /// Policy used when conflicts are resolved without an explicit choice
    pub conflict_preference: ConflictPreference,
}

impl Default for SyncPreferences {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_interval_minutes: 10,
            conflict_preference: ConflictPreference::MergeWithLabels,
        }
    }
}

impl SyncPreferences {
    /// Interval of the periodic sync loop
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.sync_interval_minutes) * 60)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.sync_interval_minutes == 0 {
            return Err(crate::Error::InvalidInput(
                "sync interval must be at least one minute".to_string(),
            ));
        }
        Ok(())
    }
}
