//! Error types for omran-core

use thiserror::Error;

/// Result type alias using omran-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in omran-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote store could not be reached (connection refused, timeout, offline)
    #[error("Network error: {0}")]
    Network(String),

    /// Remote store answered with a transient failure (408, 429, 5xx)
    #[error("Remote store error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// Remote store refused the request (4xx other than 408/429)
    #[error("Remote store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Input failed validation; the caller must correct it
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A business rule refused the operation (e.g. insufficient funds)
    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    /// Stored data could not be decoded
    #[error("Corrupted storage entry '{key}': {reason}")]
    StorageCorruption { key: String, reason: String },

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another sync run holds the sync flag
    #[error("A sync run is already in progress")]
    SyncInProgress,
}

impl Error {
    /// Whether a failed operation may succeed if attempted again.
    ///
    /// Network and transient remote failures are retryable. Validation,
    /// business-rule and rejected requests never are, and neither are local
    /// storage failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Remote { message, .. } => !is_business_rule_message(message),
            _ => false,
        }
    }

    /// Map an HTTP failure status and body to the matching error variant.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if matches!(status, 408 | 429) || status >= 500 {
            Self::Remote { status, message }
        } else if is_business_rule_message(&message) {
            Self::BusinessRule(message)
        } else {
            Self::Rejected { status, message }
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::from_status(status.as_u16(), error.to_string());
        }
        if error.is_decode() {
            return Self::Database(format!("invalid remote response: {error}"));
        }
        Self::Network(error.to_string())
    }
}

fn is_business_rule_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("insufficient") || message.contains("business rule")
}
