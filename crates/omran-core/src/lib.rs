//! omran-core - Core library for Omran Sales
//!
//! This crate contains the offline queue, its local database, the remote
//! store clients, the sync runner and scheduler, the retry wrapper, ledger
//! conflict detection and the account-scoped storage used by the point-of-sale
//! front ends.

pub mod config;
pub mod conflict;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod retry;
pub mod services;
pub mod state;
pub mod storage;
pub mod sync;
pub mod util;

pub use config::OmranConfig;
pub use error::{Error, Result};
pub use models::{DataType, OfflineDataItem, OfflinePayload, OfflineStats, SyncStatus};
pub use services::OfflineService;
pub use state::SyncState;
