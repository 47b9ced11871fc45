//! Data models for Omran Sales

mod conflict;
mod ledger;
mod offline_item;
mod payload;
mod settings;

pub use conflict::{ConflictItem, ConflictPreference, ConflictType, ResolutionReport};
pub use ledger::{CashFlowEntry, CashFlowSource, CashTransactionType, ExpenseRecord};
pub use offline_item::{OfflineDataItem, OfflineItemId, OfflineStats, SyncStatus};
pub use payload::{
    CashTransactionPayload, CustomerPayload, DataType, ExpensePayload, InvoiceItemPayload,
    InvoicePayload, OfflinePayload, ProductPayload, RemoteWrite,
};
pub use settings::{SyncPreferences, SYNC_PREFERENCES_KEY};
