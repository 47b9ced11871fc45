use omran_core::conflict::{ConflictDetector, ConflictResolver};
use omran_core::models::{ConflictPreference, ResolutionReport};
use omran_core::remote::{AuditEvent, RestRemoteStore};
use serde_json::json;

use crate::commands::common::{format_conflict_lines, print_json, Context};
use crate::error::CliError;

fn resolver(context: &Context) -> Result<ConflictResolver<RestRemoteStore>, CliError> {
    Ok(ConflictResolver::new(
        context.remote_store()?,
        ConflictDetector::default(),
        context.config.retry_options(),
    ))
}

pub async fn run_conflicts_list(context: &Context, as_json: bool) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let conflicts = resolver(context)?.get_conflicts(user_id).await?;

    if as_json {
        return print_json(&conflicts);
    }
    if conflicts.is_empty() {
        println!("No potential duplicates found.");
        return Ok(());
    }
    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_conflicts_resolve(
    context: &Context,
    prefer: Option<&str>,
) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let preference = match prefer {
        Some(prefer) => prefer.parse::<ConflictPreference>()?,
        None => {
            context
                .open_queue()?
                .load_preferences(context.account_id())
                .await?
                .conflict_preference
        }
    };

    let report = resolver(context)?
        .auto_resolve_conflicts(user_id, preference)
        .await?;
    println!(
        "Resolved {} conflict(s) with {preference}, {} failed",
        report.resolved, report.failed
    );

    if let Some(event) = resolution_audit_event(user_id, preference, &report) {
        // The audit trail must not turn a finished resolution into an error
        let recorded = match context.functions_client() {
            Ok(client) => client.record_audit_event(&event).await.map_err(CliError::from),
            Err(error) => Err(error),
        };
        if let Err(error) = recorded {
            tracing::warn!(%error, "Could not record audit event");
        }
    }
    Ok(())
}

/// Audit row for a resolution pass that changed or attempted to change data
pub fn resolution_audit_event(
    user_id: &str,
    preference: ConflictPreference,
    report: &ResolutionReport,
) -> Option<AuditEvent> {
    if report.resolved == 0 && report.failed == 0 {
        return None;
    }
    Some(AuditEvent::new(
        "ledger_conflicts_resolved",
        user_id,
        json!({
            "preference": preference.as_str(),
            "resolved": report.resolved,
            "failed": report.failed,
        }),
    ))
}
