use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "omran")]
#[command(about = "Offline queue, sync and ledger reconciliation for Omran Sales")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the local queue database
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the JSON config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// User whose queue and ledgers are used
    #[arg(long, global = true, env = "OMRAN_USER_ID", value_name = "ID")]
    pub user: Option<String>,

    /// Account scope for cached settings (defaults to the user)
    #[arg(long, global = true, value_name = "ID")]
    pub account: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect and maintain the offline queue
    Queue {
        #[command(subcommand)]
        action: QueueCommand,
    },
    /// Push pending items to the remote store
    Sync {
        /// Keep running on the account's sync interval until Ctrl-C
        #[arg(long)]
        watch: bool,
    },
    /// Find and resolve duplicates between cash flow and expenses
    Conflicts {
        #[command(subcommand)]
        action: ConflictsCommand,
    },
    /// Maintain the account-scoped settings cache
    Storage {
        #[command(subcommand)]
        action: StorageCommand,
    },
    /// Trigger a backup export on the server
    Backup,
}

#[derive(Subcommand)]
pub enum QueueCommand {
    /// Queue a local mutation
    Save {
        /// invoice, product, customer, expense or cash_transaction
        data_type: String,
        /// Record id
        id: String,
        /// JSON body; read from stdin when omitted
        json: Option<String>,
    },
    /// Show queue counts
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List queue items, oldest first
    List {
        /// Filter by status: pending, synced or error
        #[arg(long)]
        status: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete synced items
    Cleanup,
    /// Move failed items back to pending
    RetryFailed,
}

#[derive(Subcommand)]
pub enum ConflictsCommand {
    /// List potential duplicates
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve every potential duplicate
    Resolve {
        /// prefer_expense_system, prefer_cash_flow or merge_with_labels
        /// (defaults to the cached preference)
        #[arg(long)]
        prefer: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum StorageCommand {
    /// Remove corrupted cache entries
    Repair,
    /// Show cached sync preferences
    Prefs {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change cached sync preferences; omitted options keep their value
    SetPrefs {
        /// Run the periodic sync loop (true or false)
        #[arg(long, value_name = "BOOL")]
        auto_sync: Option<bool>,
        /// Minutes between periodic sync runs
        #[arg(long, value_name = "MINUTES")]
        interval: Option<u32>,
        /// prefer_expense_system, prefer_cash_flow or merge_with_labels
        #[arg(long, value_name = "POLICY")]
        conflict_preference: Option<String>,
    },
    /// Drop every cached entry of the account
    Clear,
}
