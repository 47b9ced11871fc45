//! Similarity scoring between a cash-flow entry and an expense

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::{CashFlowEntry, ExpenseRecord};
use crate::util::round_cents;

/// Pairs scoring at or above this are reported as potential duplicates
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Score given when one description contains the other
const CONTAINMENT_SCORE: f64 = 0.85;

/// Absorbs float noise after rounding; well below one cent
const AMOUNT_EPSILON: f64 = 0.005;

/// Scores how likely two ledger rows record the same spending
pub trait SimilarityStrategy: Send + Sync {
    /// Score in `[0, 1]`; 1 means certainly the same spending
    fn score(&self, cash: &CashFlowEntry, expense: &ExpenseRecord) -> f64;
}

/// Amounts must be equal once rounded to cents, then descriptions are compared.
///
/// Equal descriptions (after trimming, lower-casing and collapsing whitespace)
/// score 1.0, containment scores 0.85, anything else the Jaccard index of
/// the word sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmountDescriptionSimilarity;

impl SimilarityStrategy for AmountDescriptionSimilarity {
    fn score(&self, cash: &CashFlowEntry, expense: &ExpenseRecord) -> f64 {
        if !amounts_match(cash.amount, expense.amount) {
            return 0.0;
        }
        description_similarity(&cash.description, &expense.description)
    }
}

fn amounts_match(left: f64, right: f64) -> bool {
    (round_cents(left) - round_cents(right)).abs() < AMOUNT_EPSILON
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn words(text: &str) -> BTreeSet<&str> {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"\w+").expect("Invalid regex"))
        .find_iter(text)
        .map(|word| word.as_str())
        .collect()
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn description_similarity(left: &str, right: &str) -> f64 {
    let left = normalize(left);
    let right = normalize(right);
    if left == right {
        return 1.0;
    }
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    if left.contains(&right) || right.contains(&left) {
        return CONTAINMENT_SCORE;
    }

    let left_words = words(&left);
    let right_words = words(&right);
    let union = left_words.union(&right_words).count();
    if union == 0 {
        return 0.0;
    }
    let shared = left_words.intersection(&right_words).count();
    shared as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CashFlowSource, CashTransactionType};

    fn cash(amount: f64, description: &str) -> CashFlowEntry {
        CashFlowEntry {
            id: "c-1".to_string(),
            amount,
            description: description.to_string(),
            transaction_type: CashTransactionType::Expense,
            source: CashFlowSource::Manual,
            transaction_date: None,
        }
    }

    fn expense(amount: f64, description: &str) -> ExpenseRecord {
        ExpenseRecord {
            id: "e-1".to_string(),
            amount,
            description: description.to_string(),
            category: None,
            expense_date: None,
            cash_flow_sync: true,
        }
    }

    #[test]
    fn identical_rows_score_one() {
        let score = AmountDescriptionSimilarity.score(
            &cash(120.0, "Office  Rent"),
            &expense(120.0, " office rent "),
        );
        assert!((score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn different_amounts_score_zero() {
        let score =
            AmountDescriptionSimilarity.score(&cash(120.0, "Rent"), &expense(120.5, "Rent"));
        assert!(score.abs() < f64::EPSILON);
    }

    #[test]
    fn one_cent_apart_is_a_different_amount() {
        let score =
            AmountDescriptionSimilarity.score(&cash(10.00, "Fuel"), &expense(10.01, "Fuel"));
        assert!(score.abs() < f64::EPSILON);
    }

    #[test]
    fn cent_rounding_is_tolerated() {
        let score =
            AmountDescriptionSimilarity.score(&cash(10.004, "Fuel"), &expense(10.0, "Fuel"));
        assert!((score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn containment_scores_above_threshold() {
        let score = description_similarity("Fuel", "Fuel for delivery van");
        assert!((score - CONTAINMENT_SCORE).abs() < f64::EPSILON);
        assert!(score >= DEFAULT_SIMILARITY_THRESHOLD);
    }

    #[test]
    fn word_overlap_uses_jaccard_index() {
        // {paid, electricity, bill} vs {electricity, bill, march}: 2 shared of 4
        let score = description_similarity("Paid electricity bill", "electricity bill march");
        assert!((score - 0.5).abs() < f64::EPSILON);
        assert!(description_similarity("Rent", "Taxi").abs() < f64::EPSILON);
    }
}
