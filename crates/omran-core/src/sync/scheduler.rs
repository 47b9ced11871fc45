//! Background sync loop

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::SyncRunner;
use crate::error::Error;
use crate::remote::RemoteStore;

/// Interval of the periodic run when no preference overrides it
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(600);

/// Spawns the sync loop for one user
pub struct SyncScheduler;

/// Control handle of a running sync loop.
///
/// Dropping the handle without [`SyncHandle::shutdown`] also ends the loop.
pub struct SyncHandle {
    trigger: Arc<Notify>,
    online: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy)]
enum Wake {
    Interval,
    Trigger,
    Online,
}

impl SyncScheduler {
    /// Start the loop. The first run starts immediately, then every `interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<R>(
        runner: Arc<SyncRunner<R>>,
        user_id: impl Into<String>,
        interval: Duration,
    ) -> SyncHandle
    where
        R: RemoteStore + 'static,
    {
        let user_id = user_id.into();
        let interval = if interval.is_zero() {
            DEFAULT_SYNC_INTERVAL
        } else {
            interval
        };
        let trigger = Arc::new(Notify::new());
        let online = Arc::new(Notify::new());
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = {
            let trigger = Arc::clone(&trigger);
            let online = Arc::clone(&online);
            tokio::spawn(async move {
                tracing::info!(
                    user_id = user_id.as_str(),
                    "Sync loop started (interval: {}s)",
                    interval.as_secs()
                );
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    let wake = tokio::select! {
                        biased;
                        _ = shutdown_rx.changed() => break,
                        () = online.notified() => Wake::Online,
                        () = trigger.notified() => Wake::Trigger,
                        _ = ticker.tick() => Wake::Interval,
                    };
                    run_once(&runner, &user_id, wake).await;
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                tracing::info!(user_id = user_id.as_str(), "Sync loop stopped");
            })
        };

        SyncHandle {
            trigger,
            online,
            shutdown,
            task,
        }
    }
}

async fn run_once<R: RemoteStore>(runner: &SyncRunner<R>, user_id: &str, wake: Wake) {
    tracing::debug!(user_id, ?wake, "Starting sync run");
    match runner.sync_offline_data(user_id).await {
        Ok(_) => {}
        Err(Error::SyncInProgress) => {
            tracing::debug!(user_id, "Skipped sync: another run is active");
        }
        Err(error) => {
            tracing::warn!(user_id, %error, "Scheduled sync failed");
        }
    }
}

impl SyncHandle {
    /// Request a run as soon as the current one (if any) finishes
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Connectivity came back; pending items should go out now
    pub fn notify_online(&self) {
        tracing::info!("Connectivity restored; scheduling sync");
        self.online.notify_one();
    }

    /// Whether the loop task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop, letting an in-progress run finish first
    pub async fn shutdown(self) {
        // The receiver only disappears once the loop has exited
        let _ = self.shutdown.send(true);
        if let Err(error) = self.task.await {
            tracing::warn!("Sync loop task failed: {error}");
        }
    }
}
