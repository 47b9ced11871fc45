//! Clients for the hosted serverless functions (backup export, security audit)

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::rest::{parse_api_error, RemoteCredentials};
use crate::error::{Error, Result};
use crate::util::normalize_http_url;

const BACKUP_FUNCTION: &str = "auto-backup";
const AUDIT_FUNCTION: &str = "secure-audit-log";

/// Result of a backup export run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupReceipt {
    #[serde(default, alias = "backupId")]
    pub backup_id: Option<String>,
    /// Tables included in the export
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default, alias = "rowCount")]
    pub row_count: Option<u64>,
}

/// A security-audit row; IP address and user agent are captured server-side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: String,
    pub user_id: String,
    #[serde(default)]
    pub details: Value,
}

impl AuditEvent {
    pub fn new(event_type: impl Into<String>, user_id: impl Into<String>, details: Value) -> Self {
        Self {
            event_type: event_type.into(),
            user_id: user_id.into(),
            details,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FunctionsClient {
    base_url: String,
    credentials: RemoteCredentials,
    client: Client,
}

impl FunctionsClient {
    /// Build a client; without an explicit `functions_url` the project's
    /// `/functions/v1` path is used.
    pub fn new(credentials: RemoteCredentials, functions_url: Option<&str>) -> Result<Self> {
        let base_url = resolve_functions_url(&credentials.url, functions_url)?;
        Ok(Self {
            base_url,
            credentials,
            client: Client::builder().build()?,
        })
    }

    pub fn endpoint(&self, function: &str) -> String {
        format!("{}/{function}", self.base_url)
    }

    /// Ask the backend to export every table of `user_id` as JSON
    pub async fn trigger_backup(&self, user_id: &str) -> Result<BackupReceipt> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(Error::InvalidInput("user id must not be empty".to_string()));
        }
        let body = serde_json::json!({ "user_id": user_id });
        let response = self.invoke(BACKUP_FUNCTION, &body).await?;
        let receipt = parse_backup_receipt(response)?;
        tracing::info!(
            user_id,
            tables = receipt.tables.len(),
            "Backup export triggered"
        );
        Ok(receipt)
    }

    /// Append a row to the security-audit log
    pub async fn record_audit_event(&self, event: &AuditEvent) -> Result<()> {
        if event.event_type.trim().is_empty() {
            return Err(Error::InvalidInput(
                "audit event type must not be empty".to_string(),
            ));
        }
        self.invoke(AUDIT_FUNCTION, event).await?;
        tracing::debug!(event_type = %event.event_type, "Recorded audit event");
        Ok(())
    }

    async fn invoke(&self, function: &str, body: &impl Serialize) -> Result<Value> {
        let request = self
            .client
            .post(self.endpoint(function))
            .header("Accept", "application/json")
            .json(body);
        let response = self.credentials.authorize(request).send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Error::from_status(
                status.as_u16(),
                parse_api_error(status, &text),
            ));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn resolve_functions_url(project_url: &str, functions_url: Option<&str>) -> Result<String> {
    match functions_url.map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => normalize_http_url(url, "functions url"),
        None => {
            let project_url = normalize_http_url(project_url, "remote url")?;
            Ok(format!("{project_url}/functions/v1"))
        }
    }
}

fn parse_backup_receipt(value: Value) -> Result<BackupReceipt> {
    match value {
        Value::Null => Ok(BackupReceipt::default()),
        Value::Object(mut object) => {
            // Some deployments wrap the receipt in `data`
            let inner = match object.remove("data") {
                Some(data @ Value::Object(_)) => data,
                Some(_) | None => Value::Object(object),
            };
            Ok(serde_json::from_value(inner)?)
        }
        other => Err(Error::Database(format!(
            "unexpected backup response: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn credentials() -> RemoteCredentials {
        RemoteCredentials::new("https://project.supabase.co", "anon", None).unwrap()
    }

    #[test]
    fn endpoint_defaults_to_project_functions_path() {
        let client = FunctionsClient::new(credentials(), None).unwrap();
        assert_eq!(
            client.endpoint(BACKUP_FUNCTION),
            "https://project.supabase.co/functions/v1/auto-backup"
        );
    }

    #[test]
    fn explicit_functions_url_is_normalized() {
        let client =
            FunctionsClient::new(credentials(), Some(" http://localhost:54321/fn/ ")).unwrap();
        assert_eq!(
            client.endpoint(AUDIT_FUNCTION),
            "http://localhost:54321/fn/secure-audit-log"
        );
        assert!(FunctionsClient::new(credentials(), Some("localhost/fn")).is_err());
    }

    #[test]
    fn backup_receipt_accepts_flat_and_wrapped_payloads() {
        let flat = parse_backup_receipt(json!({
            "backup_id": "b-1",
            "tables": ["invoices", "products"],
            "row_count": 42
        }))
        .unwrap();
        assert_eq!(flat.backup_id.as_deref(), Some("b-1"));
        assert_eq!(flat.tables.len(), 2);
        assert_eq!(flat.row_count, Some(42));

        let wrapped = parse_backup_receipt(json!({
            "success": true,
            "data": {"backupId": "b-2", "tables": ["expenses"]}
        }))
        .unwrap();
        assert_eq!(wrapped.backup_id.as_deref(), Some("b-2"));
        assert_eq!(wrapped.row_count, None);

        assert_eq!(
            parse_backup_receipt(Value::Null).unwrap(),
            BackupReceipt::default()
        );
        assert!(parse_backup_receipt(json!("ok")).is_err());
    }

    #[test]
    fn audit_event_serializes_expected_fields() {
        let event = AuditEvent::new("login", "user-1", json!({"method": "password"}));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "event_type": "login",
                "user_id": "user-1",
                "details": {"method": "password"}
            })
        );
    }
}
