//! Omran CLI - drive the offline queue, sync and reconciliation from a terminal

mod cli;
mod commands;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands, ConflictsCommand, QueueCommand, StorageCommand};
use crate::commands::backup::run_backup;
use crate::commands::common::Context;
use crate::commands::conflicts::{run_conflicts_list, run_conflicts_resolve};
use crate::commands::queue::{
    run_queue_cleanup, run_queue_list, run_queue_retry_failed, run_queue_save, run_queue_stats,
};
use crate::commands::storage::{
    run_storage_clear, run_storage_prefs, run_storage_repair, run_storage_set_prefs,
};
use crate::commands::sync::run_sync;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "omran=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let context = Context::from_cli(&cli)?;

    match cli.command {
        Commands::Queue { action } => match action {
            QueueCommand::Save {
                data_type,
                id,
                json,
            } => run_queue_save(&context, &data_type, &id, json.as_deref()).await?,
            QueueCommand::Stats { json } => run_queue_stats(&context, json).await?,
            QueueCommand::List { status, json } => {
                run_queue_list(&context, status.as_deref(), json).await?;
            }
            QueueCommand::Cleanup => run_queue_cleanup(&context).await?,
            QueueCommand::RetryFailed => run_queue_retry_failed(&context).await?,
        },
        Commands::Sync { watch } => run_sync(&context, watch).await?,
        Commands::Conflicts { action } => match action {
            ConflictsCommand::List { json } => run_conflicts_list(&context, json).await?,
            ConflictsCommand::Resolve { prefer } => {
                run_conflicts_resolve(&context, prefer.as_deref()).await?;
            }
        },
        Commands::Storage { action } => match action {
            StorageCommand::Repair => run_storage_repair(&context).await?,
            StorageCommand::Prefs { json } => run_storage_prefs(&context, json).await?,
            StorageCommand::SetPrefs {
                auto_sync,
                interval,
                conflict_preference,
            } => {
                run_storage_set_prefs(
                    &context,
                    auto_sync,
                    interval,
                    conflict_preference.as_deref(),
                )
                .await?;
            }
            StorageCommand::Clear => run_storage_clear(&context).await?,
        },
        Commands::Backup => run_backup(&context).await?,
    }

    Ok(())
}
