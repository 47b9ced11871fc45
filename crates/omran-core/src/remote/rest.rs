//! PostgREST-backed remote store

use std::fmt;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{Filter, RemoteStore, Table};
use crate::error::{Error, Result};
use crate::util::{compact_text, normalize_http_url, normalize_text_option};

/// Project URL and keys used to reach the hosted backend
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCredentials {
    pub url: String,
    pub anon_key: String,
    /// Signed-in user's token; requests fall back to the anon key without it
    pub access_token: Option<String>,
}

impl RemoteCredentials {
    /// Validate and normalize credentials
    pub fn new(
        url: &str,
        anon_key: impl Into<String>,
        access_token: Option<String>,
    ) -> Result<Self> {
        let url = normalize_http_url(url, "remote url")?;
        let anon_key = normalize_text_option(Some(anon_key.into()))
            .ok_or_else(|| Error::Config("anon key must not be empty".to_string()))?;
        Ok(Self {
            url,
            anon_key,
            access_token: normalize_text_option(access_token),
        })
    }

    pub(crate) fn bearer(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.anon_key)
    }

    pub(crate) fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
    }
}

impl fmt::Debug for RemoteCredentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RemoteCredentials")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// [`RemoteStore`] over the PostgREST `/rest/v1` API
#[derive(Clone, Debug)]
pub struct RestRemoteStore {
    credentials: RemoteCredentials,
    client: Client,
}

impl RestRemoteStore {
    pub fn new(credentials: RemoteCredentials) -> Result<Self> {
        Ok(Self {
            credentials,
            client: Client::builder().build()?,
        })
    }

    fn table_url(&self, table: Table, filters: &[Filter], on_conflict: Option<&str>) -> String {
        table_url(&self.credentials.url, table, filters, on_conflict)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.credentials.authorize(request).send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::from_status(
            status.as_u16(),
            parse_api_error(status, &body),
        ))
    }

    async fn count_rows(response: Response) -> Result<usize> {
        let rows = response.json::<Vec<Value>>().await?;
        Ok(rows.len())
    }
}

impl RemoteStore for RestRemoteStore {
    async fn upsert(&self, table: Table, rows: Vec<Value>, on_conflict: &str) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let url = self.table_url(table, &[], Some(on_conflict));
        self.send(
            self.client
                .post(url)
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(&rows),
        )
        .await?;
        tracing::debug!(%table, rows = rows.len(), "Upserted rows");
        Ok(())
    }

    async fn select(&self, table: Table, filters: &[Filter]) -> Result<Vec<Value>> {
        let url = self.table_url(table, filters, None);
        let response = self
            .send(self.client.get(url).header("Accept", "application/json"))
            .await?;
        Ok(response.json::<Vec<Value>>().await?)
    }

    async fn update(&self, table: Table, filters: &[Filter], patch: Value) -> Result<usize> {
        let url = self.table_url(table, filters, None);
        let response = self
            .send(
                self.client
                    .patch(url)
                    .header("Prefer", "return=representation")
                    .json(&patch),
            )
            .await?;
        Self::count_rows(response).await
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<usize> {
        if filters.is_empty() {
            return Err(Error::InvalidInput(format!(
                "refusing to delete every row of {table}"
            )));
        }
        let url = self.table_url(table, filters, None);
        let response = self
            .send(
                self.client
                    .delete(url)
                    .header("Prefer", "return=representation"),
            )
            .await?;
        Self::count_rows(response).await
    }
}

fn table_url(base: &str, table: Table, filters: &[Filter], on_conflict: Option<&str>) -> String {
    let mut params = filters
        .iter()
        .map(|filter| {
            format!(
                "{}=eq.{}",
                urlencoding::encode(&filter.column),
                urlencoding::encode(&filter.value)
            )
        })
        .collect::<Vec<_>>();
    if let Some(columns) = on_conflict.filter(|columns| !columns.trim().is_empty()) {
        params.push(format!("on_conflict={}", urlencoding::encode(columns.trim())));
    }

    let mut url = format!("{base}/rest/v1/{table}");
    if !params.is_empty() {
        url.push('?');
        url.push_str(&params.join("&"));
    }
    url
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    message: Option<String>,
    error: Option<String>,
    details: Option<String>,
}

pub(crate) fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            let message = match normalize_text_option(payload.details) {
                Some(details) => format!("{}: {details}", message.trim()),
                None => message.trim().to_string(),
            };
            return format!("{} ({})", compact_text(&message), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}
