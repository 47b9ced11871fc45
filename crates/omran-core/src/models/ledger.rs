//! Cash-flow and expense ledger rows as read back from the remote store

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Direction of a cash-flow entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CashTransactionType {
    Income,
    Expense,
}

/// How a cash-flow entry was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashFlowSource {
    /// Typed in by a user
    #[default]
    Manual,
    /// Mirrored automatically from the expense system
    ExpenseSync,
}

/// A row of the `cash_transactions` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowEntry {
    pub id: String,
    pub amount: f64,
    pub description: String,
    pub transaction_type: CashTransactionType,
    #[serde(default)]
    pub source: CashFlowSource,
    #[serde(default)]
    pub transaction_date: Option<NaiveDate>,
}

impl CashFlowEntry {
    /// Manual outflows are the only entries that can duplicate an expense
    #[must_use]
    pub fn is_manual_outflow(&self) -> bool {
        self.transaction_type == CashTransactionType::Expense
            && self.source == CashFlowSource::Manual
    }
}

/// A row of the `expenses` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub id: String,
    pub amount: f64,
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub expense_date: Option<NaiveDate>,
    /// Whether the expense is still mirrored into the cash-flow ledger
    #[serde(default = "default_cash_flow_sync")]
    pub cash_flow_sync: bool,
}

const fn default_cash_flow_sync() -> bool {
    true
}
