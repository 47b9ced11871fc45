//! Local persistence for the offline queue

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{OfflineQueueRepository, SqliteOfflineQueueRepository};
