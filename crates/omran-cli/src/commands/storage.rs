use omran_core::models::ConflictPreference;

use crate::commands::common::{format_preferences, print_json, Context};
use crate::error::CliError;

pub async fn run_storage_repair(context: &Context) -> Result<(), CliError> {
    let removed = context
        .open_queue()?
        .repair_storage(context.account_id())
        .await?;

    if removed.is_empty() {
        println!("No corrupted entries found.");
    } else {
        for key in &removed {
            println!("Removed corrupted entry: {key}");
        }
    }
    Ok(())
}

pub async fn run_storage_clear(context: &Context) -> Result<(), CliError> {
    let cleared = context
        .open_queue()?
        .clear_storage(context.account_id())
        .await?;
    println!("Cleared {cleared} cached entry(s)");
    Ok(())
}

pub async fn run_storage_set_prefs(
    context: &Context,
    auto_sync: Option<bool>,
    interval_minutes: Option<u32>,
    conflict_preference: Option<&str>,
) -> Result<(), CliError> {
    let queue = context.open_queue()?;
    let mut preferences = queue.load_preferences(context.account_id()).await?;
    if let Some(auto_sync) = auto_sync {
        preferences.auto_sync = auto_sync;
    }
    if let Some(interval_minutes) = interval_minutes {
        preferences.sync_interval_minutes = interval_minutes;
    }
    if let Some(conflict_preference) = conflict_preference {
        preferences.conflict_preference = conflict_preference.parse::<ConflictPreference>()?;
    }

    queue
        .save_preferences(context.account_id(), &preferences)
        .await?;
    for line in format_preferences(&preferences) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_storage_prefs(context: &Context, as_json: bool) -> Result<(), CliError> {
    let preferences = context
        .open_queue()?
        .load_preferences(context.account_id())
        .await?;

    if as_json {
        return print_json(&preferences);
    }
    for line in format_preferences(&preferences) {
        println!("{line}");
    }
    Ok(())
}
