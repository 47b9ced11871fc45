//! Push the offline queue to the remote store.
//!
//! [`SyncRunner`] performs one run for one user; [`SyncScheduler`] repeats it
//! on an interval, on demand, and when connectivity returns.

mod runner;
mod scheduler;

pub use runner::{SyncRunner, SyncSnapshot};
pub use scheduler::{SyncHandle, SyncScheduler, DEFAULT_SYNC_INTERVAL};

use serde::Serialize;

/// Counts of one sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Items pushed and marked synced
    pub synced: usize,
    /// Items marked error
    pub failed: usize,
    /// Items left pending: remote unreachable, or re-saved during the run
    pub deferred: usize,
}

impl SyncReport {
    /// Whether the run touched no item
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.synced == 0 && self.failed == 0 && self.deferred == 0
    }
}
