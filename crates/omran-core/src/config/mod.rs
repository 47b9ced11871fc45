//! Runtime configuration.
//!
//! `OmranConfig` is read from a JSON file and then overridden by environment
//! variables. Keys and tokens are never printed by `Debug`.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::remote::RemoteCredentials;
use crate::retry::RetryOptions;
use crate::util::{normalize_http_url, normalize_text_option};

pub const ENV_REMOTE_URL: &str = "OMRAN_REMOTE_URL";
pub const ENV_ANON_KEY: &str = "OMRAN_ANON_KEY";
pub const ENV_ACCESS_TOKEN: &str = "OMRAN_ACCESS_TOKEN";
pub const ENV_FUNCTIONS_URL: &str = "OMRAN_FUNCTIONS_URL";
pub const ENV_SYNC_INTERVAL_SECS: &str = "OMRAN_SYNC_INTERVAL_SECS";

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OmranConfig {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Hosted backend endpoint and keys
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub anon_key: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    /// Base of the serverless functions; defaults to `<url>/functions/v1`
    #[serde(default)]
    pub functions_url: Option<String>,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("anon_key", &self.anon_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("functions_url", &self.functions_url)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SyncConfig {
    /// Seconds between periodic sync runs
    pub interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { interval_secs: 600 }
    }
}

/// Backoff policy for remote pushes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl From<&RetryConfig> for RetryOptions {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.multiplier,
            jitter: config.jitter,
            retry_condition: None,
            on_retry: None,
        }
    }
}

impl OmranConfig {
    /// Parse a config file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|error| {
            Error::Config(format!("invalid config file {}: {error}", path.display()))
        })
    }

    /// Parse a config file, or start from defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            tracing::debug!("No config file at {}; using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Apply `OMRAN_*` overrides from the process environment.
    pub fn with_env(self) -> Result<Self> {
        let values: HashMap<String, String> = std::env::vars().collect();
        self.with_overrides(|name| values.get(name).cloned())
    }

    /// Apply overrides from a variable lookup, then validate.
    ///
    /// Blank values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let value = |name: &str| normalize_text_option(lookup(name));

        if let Some(url) = value(ENV_REMOTE_URL) {
            self.remote.url = Some(url);
        }
        if let Some(anon_key) = value(ENV_ANON_KEY) {
            self.remote.anon_key = Some(anon_key);
        }
        if let Some(access_token) = value(ENV_ACCESS_TOKEN) {
            self.remote.access_token = Some(access_token);
        }
        if let Some(functions_url) = value(ENV_FUNCTIONS_URL) {
            self.remote.functions_url = Some(functions_url);
        }
        if let Some(interval) = value(ENV_SYNC_INTERVAL_SECS) {
            self.sync.interval_secs = interval.parse().map_err(|_| {
                Error::Config(format!(
                    "{ENV_SYNC_INTERVAL_SECS} must be a whole number of seconds"
                ))
            })?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Check value ranges and URL schemes.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = self.remote.url.as_deref() {
            normalize_http_url(url, "remote.url")?;
        }
        if let Some(url) = self.remote.functions_url.as_deref() {
            normalize_http_url(url, "remote.functions_url")?;
        }
        if self.sync.interval_secs == 0 {
            return Err(Error::Config(
                "sync.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.retry.multiplier.is_finite() && self.retry.multiplier >= 1.0) {
            return Err(Error::Config(
                "retry.multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::Config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Credentials of the hosted backend, `None` when neither URL nor key is set.
    pub fn remote_credentials(&self) -> Result<Option<RemoteCredentials>> {
        let url = normalize_text_option(self.remote.url.clone());
        let anon_key = normalize_text_option(self.remote.anon_key.clone());
        match (url, anon_key) {
            (None, None) => Ok(None),
            (Some(url), Some(anon_key)) => Ok(Some(RemoteCredentials::new(
                &url,
                anon_key,
                self.remote.access_token.clone(),
            )?)),
            _ => Err(Error::Config(
                "remote.url and remote.anon_key must be set together".to_string(),
            )),
        }
    }

    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs)
    }

    pub fn retry_options(&self) -> RetryOptions {
        RetryOptions::from(&self.retry)
    }
}
