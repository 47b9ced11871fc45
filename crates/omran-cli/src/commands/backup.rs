use crate::commands::common::Context;
use crate::error::CliError;

pub async fn run_backup(context: &Context) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let receipt = context.functions_client()?.trigger_backup(user_id).await?;

    match receipt.backup_id.as_deref() {
        Some(backup_id) => println!("Backup {backup_id} started"),
        None => println!("Backup started"),
    }
    if !receipt.tables.is_empty() {
        println!("Tables: {}", receipt.tables.join(", "));
    }
    if let Some(row_count) = receipt.row_count {
        println!("Rows: {row_count}");
    }
    Ok(())
}
