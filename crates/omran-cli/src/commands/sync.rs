use std::sync::Arc;
use std::time::Duration;

use omran_core::config::OmranConfig;
use omran_core::models::SyncPreferences;
use omran_core::sync::{SyncRunner, SyncScheduler};

use crate::commands::common::{format_sync_report, Context};
use crate::error::CliError;

pub async fn run_sync(context: &Context, watch: bool) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let queue = context.open_queue()?;

    let mut interval = context.config.sync_interval();
    if watch {
        let stored = queue.stored_preferences(context.account_id()).await?;
        if stored.as_ref().is_some_and(|preferences| !preferences.auto_sync) {
            println!("Automatic sync is disabled for this account.");
            println!("Enable it with `omran storage set-prefs --auto-sync true`.");
            return Ok(());
        }
        interval = watch_interval(stored.as_ref(), &context.config);
    }

    let runner = Arc::new(SyncRunner::new(
        queue,
        context.remote_store()?,
        context.config.retry_options(),
    ));

    if !watch {
        let report = runner.sync_offline_data(user_id).await?;
        println!("{}", format_sync_report(&report));
        return Ok(());
    }

    println!(
        "Syncing every {}s. Press Ctrl-C to stop.",
        interval.as_secs()
    );
    let handle = SyncScheduler::spawn(Arc::clone(&runner), user_id, interval);
    tokio::signal::ctrl_c().await?;
    handle.shutdown().await;

    let snapshot = runner.snapshot();
    if let Some(report) = snapshot.last_report {
        println!("Last run: {}", format_sync_report(&report));
    }
    Ok(())
}

/// Saved account preferences win; the config interval applies until the
/// account has saved any.
pub fn watch_interval(stored: Option<&SyncPreferences>, config: &OmranConfig) -> Duration {
    stored.map_or_else(|| config.sync_interval(), SyncPreferences::sync_interval)
}
