//! Pairing of duplicate ledger rows

use std::sync::Arc;

use super::similarity::{
    AmountDescriptionSimilarity, SimilarityStrategy, DEFAULT_SIMILARITY_THRESHOLD,
};
use crate::models::{CashFlowEntry, ConflictItem, ConflictType, ExpenseRecord};

/// Appended to the cash-flow description by the merge policy
pub const CASH_FLOW_LABEL: &str = " [cash flow]";
/// Appended to the expense description by the merge policy
pub const EXPENSE_SYSTEM_LABEL: &str = " [expense system]";

pub(crate) fn has_label(description: &str, label: &str) -> bool {
    description.trim_end().ends_with(label.trim_start())
}

/// A cash-flow entry and the expense it most likely duplicates
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicatePair {
    pub cash: CashFlowEntry,
    pub expense: ExpenseRecord,
    pub score: f64,
}

impl DuplicatePair {
    /// Both rows already carry their merge labels
    pub fn is_merged(&self) -> bool {
        has_label(&self.cash.description, CASH_FLOW_LABEL)
            && has_label(&self.expense.description, EXPENSE_SYSTEM_LABEL)
    }

    /// Read-side view of the pair, with resolution suggestions
    pub fn to_conflict(&self) -> ConflictItem {
        ConflictItem {
            conflict_type: ConflictType::PotentialDuplicate,
            description: format!(
                "Cash-flow entry \"{}\" may duplicate expense \"{}\"",
                self.cash.description.trim(),
                self.expense.description.trim()
            ),
            amount: self.cash.amount,
            cash_entry_id: self.cash.id.clone(),
            expense_id: self.expense.id.clone(),
            score: self.score,
            suggestions: vec![
                "Keep the expense record and delete the manual cash-flow entry".to_string(),
                "Keep the cash-flow entry and stop mirroring the expense".to_string(),
                "Keep both and label their descriptions".to_string(),
            ],
        }
    }
}

/// Finds manual cash-flow outflows that duplicate mirrored expenses
#[derive(Clone)]
pub struct ConflictDetector {
    strategy: Arc<dyn SimilarityStrategy>,
    threshold: f64,
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new(Arc::new(AmountDescriptionSimilarity), DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl std::fmt::Debug for ConflictDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictDetector")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl ConflictDetector {
    pub fn new(strategy: Arc<dyn SimilarityStrategy>, threshold: f64) -> Self {
        Self {
            strategy,
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Pair each candidate cash entry with at most one expense and vice versa.
    ///
    /// Only manual outflows are candidates, and only expenses still mirrored
    /// into the cash-flow ledger. A cash entry and an expense that both carry
    /// their merge labels were kept apart on purpose and never pair. Pairs are
    /// taken best score first; ties keep
    /// input order. The result is ordered like `cash_entries`.
    pub fn find_pairs(
        &self,
        cash_entries: &[CashFlowEntry],
        expenses: &[ExpenseRecord],
    ) -> Vec<DuplicatePair> {
        let mut candidates = Vec::new();
        for (cash_index, cash) in cash_entries.iter().enumerate() {
            if !cash.is_manual_outflow() {
                continue;
            }
            for (expense_index, expense) in expenses.iter().enumerate() {
                if !expense.cash_flow_sync
                    || (has_label(&cash.description, CASH_FLOW_LABEL)
                        && has_label(&expense.description, EXPENSE_SYSTEM_LABEL))
                {
                    continue;
                }
                let score = self.strategy.score(cash, expense);
                if score >= self.threshold {
                    candidates.push((score, cash_index, expense_index));
                }
            }
        }
        candidates.sort_by(|left, right| right.0.total_cmp(&left.0));

        let mut cash_taken = vec![false; cash_entries.len()];
        let mut expense_taken = vec![false; expenses.len()];
        let mut pairs = Vec::new();
        for (score, cash_index, expense_index) in candidates {
            if cash_taken[cash_index] || expense_taken[expense_index] {
                continue;
            }
            cash_taken[cash_index] = true;
            expense_taken[expense_index] = true;
            pairs.push((cash_index, score, expense_index));
        }
        pairs.sort_by_key(|(cash_index, _, _)| *cash_index);

        pairs
            .into_iter()
            .map(|(cash_index, score, expense_index)| DuplicatePair {
                cash: cash_entries[cash_index].clone(),
                expense: expenses[expense_index].clone(),
                score,
            })
            .collect()
    }

    /// Potential duplicates between the two ledgers
    pub fn detect(
        &self,
        cash_entries: &[CashFlowEntry],
        expenses: &[ExpenseRecord],
    ) -> Vec<ConflictItem> {
        self.find_pairs(cash_entries, expenses)
            .iter()
            .map(DuplicatePair::to_conflict)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CashFlowSource, CashTransactionType};
    use pretty_assertions::assert_eq;

    fn cash(id: &str, amount: f64, description: &str) -> CashFlowEntry {
        CashFlowEntry {
            id: id.to_string(),
            amount,
            description: description.to_string(),
            transaction_type: CashTransactionType::Expense,
            source: CashFlowSource::Manual,
            transaction_date: None,
        }
    }

    fn expense(id: &str, amount: f64, description: &str) -> ExpenseRecord {
        ExpenseRecord {
            id: id.to_string(),
            amount,
            description: description.to_string(),
            category: Some("operations".to_string()),
            expense_date: None,
            cash_flow_sync: true,
        }
    }

    #[test]
    fn identical_amount_and_description_is_one_conflict() {
        let conflicts = ConflictDetector::default().detect(
            &[cash("c-1", 250.0, "Shop rent")],
            &[expense("e-1", 250.0, "shop rent")],
        );

        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.conflict_type, ConflictType::PotentialDuplicate);
        assert_eq!(conflict.cash_entry_id, "c-1");
        assert_eq!(conflict.expense_id, "e-1");
        assert_eq!(conflict.suggestions.len(), 3);
        assert!((conflict.amount - 250.0).abs() < f64::EPSILON);
    }

    #[test]
    fn differing_amounts_are_not_conflicts() {
        let conflicts = ConflictDetector::default().detect(
            &[cash("c-1", 250.0, "Shop rent")],
            &[expense("e-1", 260.0, "Shop rent")],
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn one_cent_difference_is_not_a_conflict() {
        let conflicts = ConflictDetector::default().detect(
            &[cash("c-1", 10.00, "Fuel")],
            &[expense("e-1", 10.01, "Fuel")],
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn merged_rows_are_not_reported_again() {
        let text = "Quarterly maintenance of the walk-in freezer compressor, fan motors, \
                    door seals and the back room shelving units";
        let merged_cash = cash("c-1", 500.0, &format!("{text}{CASH_FLOW_LABEL}"));
        let merged_expense = expense("e-1", 500.0, &format!("{text}{EXPENSE_SYSTEM_LABEL}"));
        assert!(AmountDescriptionSimilarity.score(&merged_cash, &merged_expense) >= 0.8);

        let detector = ConflictDetector::default();
        assert!(detector
            .detect(&[merged_cash.clone()], &[merged_expense])
            .is_empty());

        // Half-merged pairs are still reported so the merge can finish
        let pairs = detector.find_pairs(&[merged_cash], &[expense("e-1", 500.0, text)]);
        assert_eq!(pairs.len(), 1);
        assert!(!pairs[0].is_merged());
    }

    #[test]
    fn income_and_mirrored_entries_are_ignored() {
        let mut income = cash("c-1", 40.0, "Fuel");
        income.transaction_type = CashTransactionType::Income;
        let mut mirrored = cash("c-2", 40.0, "Fuel");
        mirrored.source = CashFlowSource::ExpenseSync;

        let conflicts = ConflictDetector::default()
            .detect(&[income, mirrored], &[expense("e-1", 40.0, "Fuel")]);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn unmirrored_expenses_are_ignored() {
        let mut kept_apart = expense("e-1", 40.0, "Fuel");
        kept_apart.cash_flow_sync = false;

        let conflicts =
            ConflictDetector::default().detect(&[cash("c-1", 40.0, "Fuel")], &[kept_apart]);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn pairing_is_one_to_one_and_prefers_best_score() {
        let cash_entries = [
            cash("c-1", 15.0, "Fuel for van"),
            cash("c-2", 15.0, "Fuel"),
        ];
        let expenses = [expense("e-1", 15.0, "Fuel")];

        let pairs = ConflictDetector::default().find_pairs(&cash_entries, &expenses);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].cash.id, "c-2");
        assert_eq!(pairs[0].expense.id, "e-1");
    }

    #[test]
    fn threshold_is_configurable() {
        let detector = ConflictDetector::new(Arc::new(AmountDescriptionSimilarity), 0.4);
        let conflicts = detector.detect(
            &[cash("c-1", 9.0, "Paid electricity bill")],
            &[expense("e-1", 9.0, "electricity bill march")],
        );
        assert_eq!(conflicts.len(), 1);
        assert!(ConflictDetector::default()
            .detect(
                &[cash("c-1", 9.0, "Paid electricity bill")],
                &[expense("e-1", 9.0, "electricity bill march")],
            )
            .is_empty());
    }
}
