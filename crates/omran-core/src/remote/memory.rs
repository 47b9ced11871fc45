//! In-process remote store

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use super::{Filter, RemoteStore, Table};
use crate::error::{Error, Result};

/// [`RemoteStore`] kept in memory, with switchable connectivity and failure
/// injection. Used by tests and dry runs.
#[derive(Debug)]
pub struct MemoryRemoteStore {
    tables: Mutex<BTreeMap<Table, Vec<Value>>>,
    online: AtomicBool,
    write_calls: AtomicUsize,
    queued_failures: Mutex<VecDeque<(u16, String)>>,
    rejected_tables: Mutex<BTreeSet<Table>>,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    /// Empty, online store
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(BTreeMap::new()),
            online: AtomicBool::new(true),
            write_calls: AtomicUsize::new(0),
            queued_failures: Mutex::new(VecDeque::new()),
            rejected_tables: Mutex::new(BTreeSet::new()),
        }
    }

    /// Simulate losing or regaining the network
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Whether calls currently reach the store
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Fail the next write call with an HTTP-style status
    pub fn fail_next_write(&self, status: u16, message: impl Into<String>) {
        if let Ok(mut failures) = self.queued_failures.lock() {
            failures.push_back((status, message.into()));
        }
    }

    /// Reject every write to `table` with a 400
    pub fn reject_writes_to(&self, table: Table) {
        if let Ok(mut rejected) = self.rejected_tables.lock() {
            rejected.insert(table);
        }
    }

    /// Undo [`Self::reject_writes_to`]
    pub fn allow_writes_to(&self, table: Table) {
        if let Ok(mut rejected) = self.rejected_tables.lock() {
            rejected.remove(&table);
        }
    }

    /// Number of write calls received (including failed ones)
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of a table
    pub fn rows(&self, table: Table) -> Vec<Value> {
        self.tables
            .lock()
            .map(|tables| tables.get(&table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Insert rows directly, bypassing connectivity and failure injection
    pub fn seed(&self, table: Table, rows: impl IntoIterator<Item = Value>) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.entry(table).or_default().extend(rows);
        }
    }

    fn ensure_online(&self) -> Result<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(Error::Network("remote store unreachable".to_string()))
        }
    }

    fn begin_write(&self, table: Table) -> Result<()> {
        self.ensure_online()?;
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        if let Some((status, message)) = self.lock_failures()?.pop_front() {
            return Err(Error::from_status(status, message));
        }
        let rejected = self
            .rejected_tables
            .lock()
            .map_err(|_| poisoned())?
            .contains(&table);
        if rejected {
            return Err(Error::from_status(
                400,
                format!("writes to {table} are rejected"),
            ));
        }
        Ok(())
    }

    fn lock_tables(&self) -> Result<MutexGuard<'_, BTreeMap<Table, Vec<Value>>>> {
        self.tables.lock().map_err(|_| poisoned())
    }

    fn lock_failures(&self) -> Result<MutexGuard<'_, VecDeque<(u16, String)>>> {
        self.queued_failures.lock().map_err(|_| poisoned())
    }
}

fn poisoned() -> Error {
    Error::Database("memory remote store lock poisoned".to_string())
}

fn matches_all(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| filter.matches(row))
}

fn same_key(existing: &Value, incoming: &Value, key_columns: &[&str]) -> bool {
    key_columns
        .iter()
        .all(|column| incoming.get(*column).is_some() && existing.get(*column) == incoming.get(*column))
}

fn merge_into(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

impl RemoteStore for MemoryRemoteStore {
    async fn upsert(&self, table: Table, rows: Vec<Value>, on_conflict: &str) -> Result<()> {
        self.begin_write(table)?;
        let key_columns = on_conflict
            .split(',')
            .map(str::trim)
            .filter(|column| !column.is_empty())
            .collect::<Vec<_>>();

        let mut tables = self.lock_tables()?;
        let existing = tables.entry(table).or_default();
        for row in rows {
            if !row.is_object() {
                return Err(Error::from_status(400, "row must be a JSON object"));
            }
            match existing
                .iter_mut()
                .find(|current| !key_columns.is_empty() && same_key(current, &row, &key_columns))
            {
                Some(current) => merge_into(current, &row),
                None => existing.push(row),
            }
        }
        Ok(())
    }

    async fn select(&self, table: Table, filters: &[Filter]) -> Result<Vec<Value>> {
        self.ensure_online()?;
        let tables = self.lock_tables()?;
        Ok(tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(row, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(&self, table: Table, filters: &[Filter], patch: Value) -> Result<usize> {
        self.begin_write(table)?;
        let mut tables = self.lock_tables()?;
        let mut count = 0;
        if let Some(rows) = tables.get_mut(&table) {
            for row in rows.iter_mut().filter(|row| matches_all(row, filters)) {
                merge_into(row, &patch);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<usize> {
        self.begin_write(table)?;
        let mut tables = self.lock_tables()?;
        let Some(rows) = tables.get_mut(&table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !matches_all(row, filters));
        Ok(before - rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn upsert_replaces_rows_with_same_key() {
        let store = MemoryRemoteStore::new();
        store
            .upsert(Table::Invoices, vec![json!({"id": "inv-1", "total": 1})], "id")
            .await
            .unwrap();
        store
            .upsert(Table::Invoices, vec![json!({"id": "inv-1", "total": 2})], "id")
            .await
            .unwrap();

        let rows = store.rows(Table::Invoices);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["total"], 2);
        assert_eq!(store.write_calls(), 2);
    }

    #[tokio::test]
    async fn offline_store_refuses_calls() {
        let store = MemoryRemoteStore::new();
        store.set_online(false);

        let error = store
            .upsert(Table::Products, vec![json!({"id": "p-1"})], "id")
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Network(_)));
        assert!(store.select(Table::Products, &[]).await.is_err());
        assert_eq!(store.write_calls(), 0);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let store = MemoryRemoteStore::new();
        store.fail_next_write(503, "unavailable");

        let first = store
            .upsert(Table::Products, vec![json!({"id": "p-1"})], "id")
            .await;
        assert!(first.unwrap_err().is_retryable());

        store
            .upsert(Table::Products, vec![json!({"id": "p-1"})], "id")
            .await
            .unwrap();
        assert_eq!(store.rows(Table::Products).len(), 1);
    }

    #[tokio::test]
    async fn update_and_delete_by_filter() {
        let store = MemoryRemoteStore::new();
        store.seed(
            Table::Expenses,
            vec![
                json!({"id": "e-1", "user_id": "u", "description": "Rent"}),
                json!({"id": "e-2", "user_id": "u", "description": "Fuel"}),
            ],
        );

        let updated = store
            .update(
                Table::Expenses,
                &[Filter::eq("id", "e-1")],
                json!({"description": "Rent [expense system]"}),
            )
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let deleted = store
            .delete(Table::Expenses, &[Filter::eq("id", "e-2")])
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let rows = store
            .select(Table::Expenses, &[Filter::eq("user_id", "u")])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["description"], "Rent [expense system]");
    }

    #[tokio::test]
    async fn rejected_table_is_not_retryable() {
        let store = MemoryRemoteStore::new();
        store.reject_writes_to(Table::InvoiceItems);

        let error = store
            .upsert(Table::InvoiceItems, vec![json!({"id": "it-1"})], "id")
            .await
            .unwrap_err();
        assert!(!error.is_retryable());
    }
}
