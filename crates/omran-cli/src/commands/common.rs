use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use omran_core::config::OmranConfig;
use omran_core::models::{ConflictItem, OfflineDataItem, OfflineStats, SyncPreferences};
use omran_core::remote::{FunctionsClient, RemoteCredentials, RestRemoteStore};
use omran_core::sync::SyncReport;
use omran_core::OfflineService;
use serde::Serialize;

use crate::cli::Cli;
use crate::error::CliError;

/// Resolved global options shared by every command
#[derive(Debug)]
pub struct Context {
    pub db_path: PathBuf,
    pub config: OmranConfig,
    pub user_id: Option<String>,
    pub account_id: Option<String>,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let config_path = resolve_config_path(cli.config.clone());
        let config = OmranConfig::load_or_default(&config_path)?.with_env()?;
        Ok(Self::new(
            resolve_db_path(cli.db_path.clone()),
            config,
            cli.user.clone(),
            cli.account.clone(),
        ))
    }

    pub fn new(
        db_path: PathBuf,
        config: OmranConfig,
        user_id: Option<String>,
        account_id: Option<String>,
    ) -> Self {
        Self {
            db_path,
            config,
            user_id: normalize_text(user_id),
            account_id: normalize_text(account_id),
        }
    }

    pub fn user_id(&self) -> Result<&str, CliError> {
        self.user_id.as_deref().ok_or(CliError::MissingUser)
    }

    /// Explicit account, else the user
    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref().or(self.user_id.as_deref())
    }

    pub fn open_queue(&self) -> Result<OfflineService, CliError> {
        Ok(OfflineService::open_path(&self.db_path)?)
    }

    pub fn remote_credentials(&self) -> Result<RemoteCredentials, CliError> {
        self.config
            .remote_credentials()?
            .ok_or(CliError::RemoteNotConfigured)
    }

    pub fn remote_store(&self) -> Result<Arc<RestRemoteStore>, CliError> {
        Ok(Arc::new(RestRemoteStore::new(self.remote_credentials()?)?))
    }

    pub fn functions_client(&self) -> Result<FunctionsClient, CliError> {
        Ok(FunctionsClient::new(
            self.remote_credentials()?,
            self.config.remote.functions_url.as_deref(),
        )?)
    }
}

#[derive(Debug, Serialize)]
pub struct QueueListItem {
    pub id: String,
    pub data_type: String,
    pub data_id: String,
    pub sync_status: String,
    pub last_error: Option<String>,
    pub last_sync_at: Option<i64>,
    pub updated_at: i64,
}

pub fn queue_item_to_list_item(item: &OfflineDataItem) -> QueueListItem {
    QueueListItem {
        id: item.id.to_string(),
        data_type: item.data_type.to_string(),
        data_id: item.data_id.clone(),
        sync_status: item.sync_status.to_string(),
        last_error: item.last_error.clone(),
        last_sync_at: item.last_sync_at,
        updated_at: item.updated_at,
    }
}

pub fn format_queue_lines(items: &[OfflineDataItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let mut line = format!(
                "{}  {:<7}  {:<16}  {}",
                format_timestamp(item.updated_at),
                item.sync_status,
                item.data_type,
                item.data_id
            );
            if let Some(error) = item.last_error.as_deref() {
                line.push_str(&format!("  error={error}"));
            }
            line
        })
        .collect()
}

pub fn format_stats(stats: &OfflineStats) -> String {
    format!(
        "total={} pending={} synced={} error={}",
        stats.total, stats.pending, stats.synced, stats.error
    )
}

pub fn format_sync_report(report: &SyncReport) -> String {
    if report.is_empty() {
        return "Nothing to sync".to_string();
    }
    let mut summary = format!("Synced {}, failed {}", report.synced, report.failed);
    if report.deferred > 0 {
        summary.push_str(&format!(", deferred {}", report.deferred));
    }
    summary
}

pub fn format_conflict_lines(conflicts: &[ConflictItem]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{:>10.2}  cash={} expense={} score={:.2}  {}",
                conflict.amount,
                conflict.cash_entry_id,
                conflict.expense_id,
                conflict.score,
                conflict.description
            )
        })
        .collect()
}

pub fn format_preferences(preferences: &SyncPreferences) -> Vec<String> {
    vec![
        format!("auto_sync: {}", preferences.auto_sync),
        format!(
            "sync_interval_minutes: {}",
            preferences.sync_interval_minutes
        ),
        format!("conflict_preference: {}", preferences.conflict_preference),
    ]
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_text(Some(buffer)))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("OMRAN_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map_or_else(|| PathBuf::from("."), |dir| dir.join("omran"))
        .join("omran.db")
}

pub fn resolve_config_path(cli_config_path: Option<PathBuf>) -> PathBuf {
    cli_config_path
        .or_else(|| env::var_os("OMRAN_CONFIG").map(PathBuf::from))
        .unwrap_or_else(default_config_path)
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map_or_else(|| PathBuf::from("."), |dir| dir.join("omran"))
        .join("config.json")
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
