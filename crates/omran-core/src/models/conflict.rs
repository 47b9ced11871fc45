//! Ledger conflict model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of conflict found between the two ledgers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// The same spending recorded once in each ledger
    PotentialDuplicate,
}

impl ConflictType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PotentialDuplicate => "potential_duplicate",
        }
    }
}

/// A suspected duplicate between a cash-flow entry and an expense record.
///
/// Derived at read time and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictItem {
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    pub description: String,
    pub amount: f64,
    pub cash_entry_id: String,
    pub expense_id: String,
    /// Similarity score in `[0, 1]`
    pub score: f64,
    pub suggestions: Vec<String>,
}

/// Resolution policy applied to every detected conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPreference {
    /// Keep the expense record, delete the cash-flow duplicate
    PreferExpenseSystem,
    /// Keep the cash-flow entry, stop mirroring the expense
    PreferCashFlow,
    /// Keep both and relabel their descriptions
    #[default]
    MergeWithLabels,
}

impl ConflictPreference {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreferExpenseSystem => "prefer_expense_system",
            Self::PreferCashFlow => "prefer_cash_flow",
            Self::MergeWithLabels => "merge_with_labels",
        }
    }
}

impl fmt::Display for ConflictPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPreference {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "prefer_expense_system" | "expense_system" | "expense" => {
                Ok(Self::PreferExpenseSystem)
            }
            "prefer_cash_flow" | "cash_flow" | "cash" => Ok(Self::PreferCashFlow),
            "merge_with_labels" | "merge" => Ok(Self::MergeWithLabels),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown conflict preference '{other}'"
            ))),
        }
    }
}

/// Outcome of an automatic resolution pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub resolved: usize,
    pub failed: usize,
}
