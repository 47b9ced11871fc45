pub mod backup;
pub mod common;
pub mod conflicts;
pub mod queue;
pub mod storage;
pub mod sync;
