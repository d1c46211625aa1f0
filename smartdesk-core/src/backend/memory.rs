//! In-process table backend.
//!
//! Keeps rows in memory with the same merge semantics as the REST backend.
//! Used for offline runs and tests; failures can be injected per row id.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;

use super::{BackendError, BackendResult, Row, TableBackend};

#[derive(Default)]
struct Tables {
    rows: HashMap<String, Vec<Row>>,
    failing_ids: HashSet<String>,
    failing_tables: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryBackend {
    user_id: Mutex<Option<String>>,
    tables: Mutex<Tables>,
    calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: &str) -> Self {
        let backend = Self::new();
        backend.set_user(Some(user_id.to_string()));
        backend
    }

    pub fn set_user(&self, user_id: Option<String>) {
        *self.user_id.lock().unwrap_or_else(|e| e.into_inner()) = user_id;
    }

    /// Seed a row directly, bypassing conflict handling.
    pub fn insert_row(&self, table: &str, row: Row) {
        self.tables()
            .rows
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables().rows.get(table).cloned().unwrap_or_default()
    }

    /// Make every write touching `id` fail until cleared.
    pub fn fail_id(&self, id: &str) {
        self.tables().failing_ids.insert(id.to_string());
    }

    /// Make every request against `table` fail until cleared.
    pub fn fail_table(&self, table: &str) {
        self.tables().failing_tables.insert(table.to_string());
    }

    pub fn clear_failures(&self) {
        let mut tables = self.tables();
        tables.failing_ids.clear();
        tables.failing_tables.clear();
    }

    /// Number of requests served so far, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self, table: &str, id: Option<&str>) -> BackendResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tables = self.tables();
        if tables.failing_tables.contains(table) {
            return Err(BackendError::Rejected(format!("table {table} unavailable")));
        }
        if let Some(id) = id {
            if tables.failing_ids.contains(id) {
                return Err(BackendError::Rejected(format!("row {id} rejected")));
            }
        }
        Ok(())
    }
}

fn row_id(row: &Row, column: &str) -> Option<String> {
    match row.get(column) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

impl TableBackend for MemoryBackend {
    fn current_user_id(&self) -> Option<String> {
        self.user_id.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn select_all(&self, table: &str) -> BackendResult<Vec<Row>> {
        self.check(table, None)?;
        Ok(self.rows(table))
    }

    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> BackendResult<Row> {
        let key = row_id(&row, on_conflict)
            .ok_or_else(|| {
                BackendError::Rejected(format!("row is missing conflict column {on_conflict}"))
            })?;
        self.check(table, Some(&key))?;

        let mut tables = self.tables();
        let rows = tables.rows.entry(table.to_string()).or_default();

        match rows
            .iter_mut()
            .find(|existing| row_id(existing, on_conflict).as_deref() == Some(key.as_str()))
        {
            Some(existing) => {
                existing.extend(row);
                Ok(existing.clone())
            }
            None => {
                rows.push(row.clone());
                Ok(row)
            }
        }
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> BackendResult<()> {
        self.check(table, Some(id))?;

        let mut tables = self.tables();
        let existing = tables
            .rows
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| row_id(r, "id").as_deref() == Some(id)))
            .ok_or_else(|| BackendError::Rejected(format!("no row {id} in {table}")))?;
        existing.extend(patch);
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> BackendResult<()> {
        self.check(table, Some(id))?;

        if let Some(rows) = self.tables().rows.get_mut(table) {
            rows.retain(|r| row_id(r, "id").as_deref() != Some(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn upsert_merges_on_conflict_column() {
        let backend = MemoryBackend::new();
        backend
            .upsert("tags", row(json!({"id": "1", "name": "a", "color": "red"})), "id")
            .await
            .unwrap();
        let stored = backend
            .upsert("tags", row(json!({"id": "1", "name": "b"})), "id")
            .await
            .unwrap();

        assert_eq!(stored["name"], "b");
        assert_eq!(stored["color"], "red");
        assert_eq!(backend.rows("tags").len(), 1);
    }

    #[tokio::test]
    async fn injected_failures_only_hit_their_row() {
        let backend = MemoryBackend::new();
        backend.fail_id("bad");

        assert!(backend.upsert("tags", row(json!({"id": "bad"})), "id").await.is_err());
        assert!(backend.upsert("tags", row(json!({"id": "good"})), "id").await.is_ok());
        assert_eq!(backend.call_count(), 2);
    }
}
