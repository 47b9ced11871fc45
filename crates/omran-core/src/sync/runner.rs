//! One sync run over the pending queue of a user.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use super::SyncReport;
use crate::error::{Error, Result};
use crate::models::OfflineDataItem;
use crate::remote::RemoteStore;
use crate::retry::{self, RetryOptions};
use crate::services::OfflineService;
use crate::state::SyncState;
use crate::util::unix_millis_now;

/// Observable status of the runner.
///
/// A runner that has never completed a run has `last_sync_at == None` and no
/// `last_report`; its `state` is then the idle default, not a sync result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSnapshot {
    pub state: SyncState,
    /// End of the last completed run (Unix ms)
    pub last_sync_at: Option<i64>,
    pub last_report: Option<SyncReport>,
}

/// Pushes pending queue items to the remote store.
///
/// At most one run is active per runner; a concurrent call fails with
/// [`Error::SyncInProgress`] without reading the queue.
pub struct SyncRunner<R> {
    queue: OfflineService,
    remote: Arc<R>,
    retry: RetryOptions,
    is_syncing: AtomicBool,
    snapshot: Mutex<SyncSnapshot>,
}

/// Clears the syncing flag when a run ends, including by early return
struct SyncFlag<'a>(&'a AtomicBool);

impl Drop for SyncFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum ItemOutcome {
    Synced,
    Superseded,
    Unreachable,
    Failed,
}

impl<R: RemoteStore> SyncRunner<R> {
    pub fn new(queue: OfflineService, remote: Arc<R>, retry: RetryOptions) -> Self {
        Self {
            queue,
            remote,
            retry,
            is_syncing: AtomicBool::new(false),
            snapshot: Mutex::new(SyncSnapshot::default()),
        }
    }

    pub const fn queue(&self) -> &OfflineService {
        &self.queue
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn is_syncing(&self) -> bool {
        self.is_syncing.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SyncState {
        self.snapshot().state
    }

    fn update_snapshot(&self, update: impl FnOnce(&mut SyncSnapshot)) {
        update(&mut self.snapshot.lock().unwrap_or_else(PoisonError::into_inner));
    }

    /// Push every pending item of `user_id` and record the outcome per item.
    ///
    /// Items are independent: a failed push marks that item error and the run
    /// continues. When the remote store is unreachable the item and every item
    /// after it stay pending without further pushes, and the runner reports
    /// [`SyncState::Offline`].
    pub async fn sync_offline_data(&self, user_id: &str) -> Result<SyncReport> {
        if self
            .is_syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::SyncInProgress);
        }
        let _flag = SyncFlag(&self.is_syncing);
        self.update_snapshot(|snapshot| snapshot.state = SyncState::Syncing);

        match self.run(user_id).await {
            Ok((report, unreachable)) => {
                let state = if report.failed > 0 {
                    SyncState::Error
                } else if unreachable > 0 {
                    SyncState::Offline
                } else {
                    SyncState::Synced
                };
                self.update_snapshot(|snapshot| {
                    snapshot.state = state;
                    snapshot.last_sync_at = Some(unix_millis_now());
                    snapshot.last_report = Some(report);
                });
                tracing::info!(
                    user_id,
                    synced = report.synced,
                    failed = report.failed,
                    deferred = report.deferred,
                    "Sync run finished"
                );
                Ok(report)
            }
            Err(error) => {
                self.update_snapshot(|snapshot| snapshot.state = SyncState::Error);
                tracing::error!(user_id, %error, "Sync run aborted");
                Err(error)
            }
        }
    }

    async fn run(&self, user_id: &str) -> Result<(SyncReport, usize)> {
        let items = self.queue.pending_items(user_id).await?;
        let mut report = SyncReport::default();
        let mut unreachable = 0;

        if items.is_empty() {
            tracing::debug!(user_id, "Nothing to sync");
        }

        for (index, item) in items.iter().enumerate() {
            if unreachable > 0 {
                let remaining = items.len() - index;
                tracing::info!(
                    user_id,
                    remaining,
                    "Remote store unreachable; deferring the rest"
                );
                report.deferred += remaining;
                unreachable += remaining;
                break;
            }
            match self.sync_item(item).await? {
                ItemOutcome::Synced => report.synced += 1,
                ItemOutcome::Superseded => report.deferred += 1,
                ItemOutcome::Unreachable => {
                    report.deferred += 1;
                    unreachable += 1;
                }
                ItemOutcome::Failed => report.failed += 1,
            }
        }
        Ok((report, unreachable))
    }

    async fn sync_item(&self, item: &OfflineDataItem) -> Result<ItemOutcome> {
        match self.push_item(item).await {
            Ok(()) => {
                if self.queue.mark_synced(item, unix_millis_now()).await? {
                    Ok(ItemOutcome::Synced)
                } else {
                    tracing::debug!(
                        data_type = %item.data_type,
                        data_id = %item.data_id,
                        "Item re-saved during sync; left pending"
                    );
                    Ok(ItemOutcome::Superseded)
                }
            }
            Err(Error::Network(message)) => {
                tracing::warn!(
                    data_type = %item.data_type,
                    data_id = %item.data_id,
                    "Remote store unreachable: {message}"
                );
                Ok(ItemOutcome::Unreachable)
            }
            Err(error) => {
                tracing::warn!(
                    data_type = %item.data_type,
                    data_id = %item.data_id,
                    %error,
                    "Failed to sync item"
                );
                self.queue.mark_error(&item.id, &error.to_string()).await?;
                Ok(ItemOutcome::Failed)
            }
        }
    }

    /// Upsert the item's rows, one retried call per target table.
    ///
    /// The calls are independent; a failure after the first leaves earlier
    /// tables written, and the next push rewrites them idempotently.
    async fn push_item(&self, item: &OfflineDataItem) -> Result<()> {
        let remote = self.remote.as_ref();
        for write in item.data_content.remote_writes(&item.user_id) {
            let table = write.table;
            let on_conflict = write.on_conflict;
            let rows = &write.rows;
            let result = retry::execute(
                move || remote.upsert(table, rows.clone(), on_conflict),
                &self.retry,
            )
            .await;
            if result.attempts > 1 {
                tracing::debug!(%table, attempts = result.attempts, "Push needed retries");
            }
            result.into_result()?;
        }
        Ok(())
    }
}
