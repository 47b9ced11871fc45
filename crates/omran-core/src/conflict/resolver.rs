//! Reading both ledgers and applying resolution policies

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::detector::{
    has_label, ConflictDetector, DuplicatePair, CASH_FLOW_LABEL, EXPENSE_SYSTEM_LABEL,
};
use crate::error::Result;
use crate::models::{
    CashFlowEntry, ConflictItem, ConflictPreference, ExpenseRecord, ResolutionReport,
};
use crate::remote::{Filter, RemoteStore, Table};
use crate::retry::{self, RetryOptions};

/// Detects and resolves duplicates for one remote store
pub struct ConflictResolver<R> {
    remote: Arc<R>,
    detector: ConflictDetector,
    retry: RetryOptions,
}

impl<R: RemoteStore> ConflictResolver<R> {
    pub fn new(remote: Arc<R>, detector: ConflictDetector, retry: RetryOptions) -> Self {
        Self {
            remote,
            detector,
            retry,
        }
    }

    /// Potential duplicates in the user's ledgers
    pub async fn get_conflicts(&self, user_id: &str) -> Result<Vec<ConflictItem>> {
        let pairs = self.duplicate_pairs(user_id).await?;
        Ok(pairs.iter().map(DuplicatePair::to_conflict).collect())
    }

    async fn duplicate_pairs(&self, user_id: &str) -> Result<Vec<DuplicatePair>> {
        let owner = [Filter::eq("user_id", user_id)];
        let cash_rows = self.select(Table::CashTransactions, &owner).await?;
        let expense_rows = self.select(Table::Expenses, &owner).await?;
        let cash_entries: Vec<CashFlowEntry> = decode_rows(Table::CashTransactions, cash_rows);
        let expenses: Vec<ExpenseRecord> = decode_rows(Table::Expenses, expense_rows);
        Ok(self.detector.find_pairs(&cash_entries, &expenses))
    }

    /// Apply `preference` to every detected duplicate.
    ///
    /// Each remote call stands alone: a failed pair is counted and logged and
    /// the remaining pairs are still processed.
    pub async fn auto_resolve_conflicts(
        &self,
        user_id: &str,
        preference: ConflictPreference,
    ) -> Result<ResolutionReport> {
        let pairs = self.duplicate_pairs(user_id).await?;
        let mut report = ResolutionReport::default();

        for pair in &pairs {
            match self.resolve_pair(user_id, pair, preference).await {
                Ok(true) => report.resolved += 1,
                Ok(false) => {
                    tracing::debug!(
                        cash_entry_id = %pair.cash.id,
                        expense_id = %pair.expense.id,
                        "Conflict already merged"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        cash_entry_id = %pair.cash.id,
                        expense_id = %pair.expense.id,
                        %error,
                        "Failed to resolve conflict"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            user_id,
            %preference,
            resolved = report.resolved,
            failed = report.failed,
            "Conflict resolution finished"
        );
        Ok(report)
    }

    /// Apply one policy to one pair; `false` when there was nothing to change.
    async fn resolve_pair(
        &self,
        user_id: &str,
        pair: &DuplicatePair,
        preference: ConflictPreference,
    ) -> Result<bool> {
        let cash_row = [Filter::eq("id", &pair.cash.id), Filter::eq("user_id", user_id)];
        let expense_row = [
            Filter::eq("id", &pair.expense.id),
            Filter::eq("user_id", user_id),
        ];

        match preference {
            ConflictPreference::PreferExpenseSystem => {
                self.delete(Table::CashTransactions, &cash_row).await?;
            }
            ConflictPreference::PreferCashFlow => {
                self.update(Table::Expenses, &expense_row, json!({"cash_flow_sync": false}))
                    .await?;
            }
            ConflictPreference::MergeWithLabels => {
                if pair.is_merged() {
                    return Ok(false);
                }
                // Only the side still missing its label is written
                let cash_result = if has_label(&pair.cash.description, CASH_FLOW_LABEL) {
                    Ok(0)
                } else {
                    self.update(
                        Table::CashTransactions,
                        &cash_row,
                        json!({"description": labelled(&pair.cash.description, CASH_FLOW_LABEL)}),
                    )
                    .await
                };
                let expense_result =
                    if has_label(&pair.expense.description, EXPENSE_SYSTEM_LABEL) {
                        Ok(0)
                    } else {
                        self.update(
                            Table::Expenses,
                            &expense_row,
                            json!({
                                "description":
                                    labelled(&pair.expense.description, EXPENSE_SYSTEM_LABEL)
                            }),
                        )
                        .await
                    };
                cash_result?;
                expense_result?;
            }
        }
        Ok(true)
    }

    async fn select(&self, table: Table, filters: &[Filter]) -> Result<Vec<Value>> {
        let remote = self.remote.as_ref();
        retry::execute(move || remote.select(table, filters), &self.retry)
            .await
            .into_result()
    }

    async fn update(&self, table: Table, filters: &[Filter], patch: Value) -> Result<usize> {
        let remote = self.remote.as_ref();
        let patch = &patch;
        retry::execute(
            move || remote.update(table, filters, patch.clone()),
            &self.retry,
        )
        .await
        .into_result()
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<usize> {
        let remote = self.remote.as_ref();
        retry::execute(move || remote.delete(table, filters), &self.retry)
            .await
            .into_result()
    }
}

fn labelled(description: &str, label: &str) -> String {
    let description = description.trim_end();
    if has_label(description, label) {
        description.to_string()
    } else {
        format!("{description}{label}")
    }
}

fn decode_rows<T: DeserializeOwned>(table: Table, rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!(%table, %error, "Skipping undecodable ledger row");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn resolver() -> ConflictResolver<MemoryRemoteStore> {
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.seed(
            Table::CashTransactions,
            vec![
                json!({
                    "id": "c-1", "user_id": "user-1", "amount": 75.0,
                    "description": "Generator fuel", "transaction_type": "expense",
                    "source": "manual", "transaction_date": "2024-05-02"
                }),
                json!({
                    "id": "c-2", "user_id": "user-1", "amount": 75.0,
                    "description": "Generator fuel", "transaction_type": "expense",
                    "source": "expense_sync"
                }),
                json!({
                    "id": "c-3", "user_id": "user-2", "amount": 75.0,
                    "description": "Generator fuel", "transaction_type": "expense"
                }),
                json!({"id": "broken", "user_id": "user-1"}),
            ],
        );
        remote.seed(
            Table::Expenses,
            vec![json!({
                "id": "e-1", "user_id": "user-1", "amount": 75.0,
                "description": "generator fuel", "category": "utilities",
                "expense_date": "2024-05-02", "cash_flow_sync": true
            })],
        );
        let retry = RetryOptions {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            ..RetryOptions::database()
        };
        ConflictResolver::new(remote, ConflictDetector::default(), retry)
    }

    fn find<'a>(rows: &'a [Value], id: &str) -> Option<&'a Value> {
        rows.iter().find(|row| row["id"] == id)
    }

    #[tokio::test]
    async fn lists_conflicts_for_the_user_only() {
        let resolver = resolver();
        let conflicts = resolver.get_conflicts("user-1").await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].cash_entry_id, "c-1");
        assert!(resolver.get_conflicts("user-3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn prefer_expense_system_deletes_cash_entry() {
        let resolver = resolver();
        let report = resolver
            .auto_resolve_conflicts("user-1", ConflictPreference::PreferExpenseSystem)
            .await
            .unwrap();

        assert_eq!(report, ResolutionReport { resolved: 1, failed: 0 });
        let rows = resolver.remote.rows(Table::CashTransactions);
        assert!(find(&rows, "c-1").is_none());
        assert!(find(&rows, "c-2").is_some());
        assert!(resolver.get_conflicts("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn prefer_cash_flow_stops_mirroring_expense() {
        let resolver = resolver();
        let report = resolver
            .auto_resolve_conflicts("user-1", ConflictPreference::PreferCashFlow)
            .await
            .unwrap();

        assert_eq!(report.resolved, 1);
        let expenses = resolver.remote.rows(Table::Expenses);
        assert_eq!(find(&expenses, "e-1").unwrap()["cash_flow_sync"], false);
        assert!(resolver.get_conflicts("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn merge_labels_both_descriptions() {
        let resolver = resolver();
        resolver
            .auto_resolve_conflicts("user-1", ConflictPreference::MergeWithLabels)
            .await
            .unwrap();

        let cash = resolver.remote.rows(Table::CashTransactions);
        let expenses = resolver.remote.rows(Table::Expenses);
        assert_eq!(
            find(&cash, "c-1").unwrap()["description"],
            "Generator fuel [cash flow]"
        );
        assert_eq!(
            find(&expenses, "e-1").unwrap()["description"],
            "generator fuel [expense system]"
        );
        assert!(resolver.get_conflicts("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn long_descriptions_are_merged_once() {
        let text = "Quarterly maintenance of the walk-in freezer compressor, fan motors, \
                    door seals and the back room shelving units";
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.seed(
            Table::CashTransactions,
            vec![json!({
                "id": "c-9", "user_id": "user-1", "amount": 500.0,
                "description": text, "transaction_type": "expense"
            })],
        );
        remote.seed(
            Table::Expenses,
            vec![json!({
                "id": "e-9", "user_id": "user-1", "amount": 500.0,
                "description": text, "cash_flow_sync": true
            })],
        );
        let resolver =
            ConflictResolver::new(remote, ConflictDetector::default(), RetryOptions::database());

        let first = resolver
            .auto_resolve_conflicts("user-1", ConflictPreference::MergeWithLabels)
            .await
            .unwrap();
        assert_eq!(first, ResolutionReport { resolved: 1, failed: 0 });
        assert!(resolver.get_conflicts("user-1").await.unwrap().is_empty());

        let second = resolver
            .auto_resolve_conflicts("user-1", ConflictPreference::MergeWithLabels)
            .await
            .unwrap();
        assert_eq!(second, ResolutionReport::default());
    }

    #[tokio::test]
    async fn half_merged_pair_only_labels_the_missing_side() {
        let resolver = resolver();
        resolver.remote.reject_writes_to(Table::Expenses);
        let report = resolver
            .auto_resolve_conflicts("user-1", ConflictPreference::MergeWithLabels)
            .await
            .unwrap();
        assert_eq!(report.failed, 1);

        resolver.remote.allow_writes_to(Table::Expenses);
        let writes_before = resolver.remote.write_calls();
        let report = resolver
            .auto_resolve_conflicts("user-1", ConflictPreference::MergeWithLabels)
            .await
            .unwrap();
        assert_eq!(report.resolved, 1);
        assert_eq!(resolver.remote.write_calls(), writes_before + 1);

        let cash = resolver.remote.rows(Table::CashTransactions);
        let expenses = resolver.remote.rows(Table::Expenses);
        assert_eq!(
            find(&cash, "c-1").unwrap()["description"],
            "Generator fuel [cash flow]"
        );
        assert_eq!(
            find(&expenses, "e-1").unwrap()["description"],
            "generator fuel [expense system]"
        );
    }

    #[tokio::test]
    async fn failed_call_is_counted() {
        let resolver = resolver();
        resolver.remote.reject_writes_to(Table::Expenses);

        let report = resolver
            .auto_resolve_conflicts("user-1", ConflictPreference::PreferCashFlow)
            .await
            .unwrap();
        assert_eq!(report, ResolutionReport { resolved: 0, failed: 1 });
    }

    #[test]
    fn labels_are_not_repeated() {
        assert_eq!(labelled("Rent", CASH_FLOW_LABEL), "Rent [cash flow]");
        assert_eq!(labelled("Rent [cash flow]", CASH_FLOW_LABEL), "Rent [cash flow]");
    }
}
