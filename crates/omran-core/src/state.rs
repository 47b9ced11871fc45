//! Shared sync state types.

use serde::Serialize;

/// Observable state of the sync runner, shown by front ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// The remote store was unreachable on the last attempt.
    Offline,
    /// A sync run is in progress.
    Syncing,
    /// The last run pushed every pending item (or there was nothing to push).
    ///
    /// Also the idle state before the first run; the runner's snapshot tells
    /// the two apart by its missing `last_sync_at`.
    #[default]
    Synced,
    /// The last run left at least one item in error.
    Error,
}
