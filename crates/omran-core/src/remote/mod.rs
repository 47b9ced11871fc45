//! Remote relational store.
//!
//! The hosted backend is reached through [`RemoteStore`]: upsert, select,
//! update and delete against named tables. [`RestRemoteStore`] talks to a
//! PostgREST endpoint; [`MemoryRemoteStore`] keeps rows in-process.

mod functions;
mod memory;
mod rest;

pub use functions::{AuditEvent, BackupReceipt, FunctionsClient};
pub use memory::MemoryRemoteStore;
pub use rest::{RemoteCredentials, RestRemoteStore};

use std::fmt;
use std::future::Future;

use serde_json::Value;

use crate::error::Result;

/// Tables of the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Products,
    Customers,
    Invoices,
    InvoiceItems,
    Expenses,
    CashTransactions,
    OfflineData,
    AutoBackupLogs,
    UserSessions,
    SecureAuditEvents,
}

impl Table {
    /// Table name on the remote side
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Customers => "customers",
            Self::Invoices => "invoices",
            Self::InvoiceItems => "invoice_items",
            Self::Expenses => "expenses",
            Self::CashTransactions => "cash_transactions",
            Self::OfflineData => "offline_data",
            Self::AutoBackupLogs => "auto_backup_logs",
            Self::UserSessions => "user_sessions",
            Self::SecureAuditEvents => "secure_audit_events",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column equality filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    /// `column = value`
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Whether a JSON row satisfies this filter
    pub fn matches(&self, row: &Value) -> bool {
        match row.get(&self.column) {
            Some(Value::String(text)) => *text == self.value,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == self.value,
        }
    }
}

/// Operations the sync engine needs from the hosted store.
///
/// Each call is its own atomic unit on the remote side; nothing spans calls.
pub trait RemoteStore: Send + Sync {
    /// Insert rows, replacing existing rows with the same `on_conflict` key
    fn upsert(
        &self,
        table: Table,
        rows: Vec<Value>,
        on_conflict: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Rows matching every filter
    fn select(
        &self,
        table: Table,
        filters: &[Filter],
    ) -> impl Future<Output = Result<Vec<Value>>> + Send;

    /// Merge `patch` into every row matching the filters, returning the count
    fn update(
        &self,
        table: Table,
        filters: &[Filter],
        patch: Value,
    ) -> impl Future<Output = Result<usize>> + Send;

    /// Delete every row matching the filters, returning the count
    fn delete(
        &self,
        table: Table,
        filters: &[Filter],
    ) -> impl Future<Output = Result<usize>> + Send;
}
