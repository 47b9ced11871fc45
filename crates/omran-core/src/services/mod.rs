//! Async service layer shared by front ends.

mod offline;

pub use offline::OfflineService;
