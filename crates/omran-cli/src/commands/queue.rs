use omran_core::models::{DataType, OfflinePayload, SyncStatus};

use crate::commands::common::{
    format_queue_lines, format_stats, print_json, queue_item_to_list_item, read_piped_stdin,
    Context, QueueListItem,
};
use crate::error::CliError;

pub async fn run_queue_save(
    context: &Context,
    data_type: &str,
    id: &str,
    json: Option<&str>,
) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let data_type: DataType = data_type.parse()?;
    let raw = match json {
        Some(json) => json.to_string(),
        None => read_piped_stdin()?.ok_or(CliError::EmptyPayload)?,
    };
    let content: serde_json::Value = serde_json::from_str(&raw)?;
    let payload = OfflinePayload::from_parts(data_type, id.trim(), content)?;

    let queue = context.open_queue()?;
    let item = queue.save_offline_data(user_id, &payload).await?;
    println!(
        "Queued {} {} ({})",
        item.data_type, item.data_id, item.sync_status
    );
    Ok(())
}

pub async fn run_queue_stats(context: &Context, as_json: bool) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let stats = context.open_queue()?.get_offline_stats(user_id).await?;
    if as_json {
        print_json(&stats)
    } else {
        println!("{}", format_stats(&stats));
        Ok(())
    }
}

pub async fn run_queue_list(
    context: &Context,
    status: Option<&str>,
    as_json: bool,
) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let status = status.map(str::parse::<SyncStatus>).transpose()?;
    let items = context.open_queue()?.list_items(user_id, status).await?;

    if as_json {
        let json_items = items
            .iter()
            .map(queue_item_to_list_item)
            .collect::<Vec<QueueListItem>>();
        return print_json(&json_items);
    }

    if items.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }
    for line in format_queue_lines(&items) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_queue_cleanup(context: &Context) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let removed = context.open_queue()?.cleanup_synced(user_id).await?;
    println!("Removed {removed} synced item(s)");
    Ok(())
}

pub async fn run_queue_retry_failed(context: &Context) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let requeued = context.open_queue()?.retry_failed(user_id).await?;
    println!("Requeued {requeued} failed item(s)");
    Ok(())
}
