//! Duplicate detection between the cash-flow ledger and the expense system.
//!
//! Expenses are mirrored into the cash-flow ledger automatically. A user who
//! also types the same spending in by hand creates a duplicate; the detector
//! finds those pairs and the resolver applies one of the
//! [`ConflictPreference`](crate::models::ConflictPreference) policies.

mod detector;
mod resolver;
mod similarity;

pub use detector::{ConflictDetector, DuplicatePair, CASH_FLOW_LABEL, EXPENSE_SYSTEM_LABEL};
pub use resolver::ConflictResolver;
pub use similarity::{
    AmountDescriptionSimilarity, SimilarityStrategy, DEFAULT_SIMILARITY_THRESHOLD,
};
