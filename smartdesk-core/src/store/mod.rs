//! Observable client-side entity stores.
//!
//! A store owns the in-memory collection for one record type. Mutations are
//! applied locally first (optimistic) and marked unsynced; `sync_pending`
//! pushes them and `sync_from_server` pulls the server state back in,
//! resolving conflicts by last-write-wins on `updated_at`.

mod report;
mod synced;

pub use report::{ItemOutcome, SyncDirection, SyncReport};
pub use synced::{Mutation, MutationOp, SyncedEntityStore};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, watch};
use uuid::Uuid;

use crate::adapter::EntityAdapter;
use crate::backend::TableBackend;
use crate::entity::{Entity, EntityRules};
use crate::error::{SmartDeskError, SmartDeskResult};

pub struct EntityStore<T: Entity, B: TableBackend> {
    adapter: EntityAdapter<T, B>,
    rules: EntityRules,
    state: watch::Sender<Vec<T>>,
    in_flight: Mutex<()>,
}

impl<T: Entity, B: TableBackend> EntityStore<T, B> {
    pub fn new(backend: Arc<B>) -> Self {
        let (state, _) = watch::channel(Vec::new());
        EntityStore {
            adapter: EntityAdapter::new(backend),
            rules: T::rules(),
            state,
            in_flight: Mutex::new(()),
        }
    }

    pub fn adapter(&self) -> &EntityAdapter<T, B> {
        &self.adapter
    }

    pub fn table(&self) -> &'static str {
        self.adapter.table()
    }

    /// Watch the collection; the receiver sees every committed mutation.
    pub fn subscribe(&self) -> watch::Receiver<Vec<T>> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.state.borrow().clone()
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.state.borrow().iter().find(|e| e.id() == id).cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.state
            .borrow()
            .iter()
            .filter(|e| !e.base().is_synced)
            .count()
    }

    /// Build a record from `draft` and append it locally. Returns the new id.
    ///
    /// The draft must carry `createdAt` and every required field of the
    /// record type; defaults fill the rest. Nothing touches the network.
    pub fn add(&self, draft: Map<String, Value>) -> SmartDeskResult<String> {
        if !is_present(&draft, "createdAt") {
            return Err(SmartDeskError::MissingField("createdAt".into()));
        }
        for field in &self.rules.required_fields {
            if !is_present(&draft, field) {
                return Err(SmartDeskError::MissingField((*field).to_string()));
            }
        }

        let mut fields = self.rules.defaults.clone();
        fields.extend(draft);

        let id = match fields.get("id") {
            Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        if self.get(&id).is_some() {
            return Err(self.invalid(format!("{id} already exists")));
        }

        fields.insert("id".into(), Value::String(id.clone()));
        fields.insert("trashed".into(), Value::Bool(false));
        fields.insert("isSynced".into(), Value::Bool(false));
        if !is_present(&fields, "updatedAt") {
            let created = fields.get("createdAt").cloned().unwrap_or(Value::Null);
            fields.insert("updatedAt".into(), created);
        }

        let entity: T =
            serde_json::from_value(Value::Object(fields)).map_err(|e| self.invalid(e.to_string()))?;

        self.state.send_modify(|items| items.push(entity));
        Ok(id)
    }

    /// Merge `patch` over the stored record and mark it unsynced.
    pub fn update(&self, id: &str, patch: Map<String, Value>) -> SmartDeskResult<()> {
        let requested_at: DateTime<Utc> = match patch.get("updatedAt") {
            Some(value) if !value.is_null() => serde_json::from_value(value.clone())
                .map_err(|e| self.invalid(format!("updatedAt: {e}")))?,
            _ => return Err(SmartDeskError::MissingField("updatedAt".into())),
        };

        let mut result = Err(SmartDeskError::NotFound(format!("{} {}", self.table(), id)));
        self.state.send_if_modified(|items| {
            let Some(slot) = items.iter_mut().find(|e| e.id() == id) else {
                return false;
            };
            result = self.merge_patch(slot, patch, requested_at);
            result.is_ok()
        });
        result
    }

    pub fn soft_delete(&self, id: &str) -> SmartDeskResult<DateTime<Utc>> {
        self.set_trashed(id, true)
    }

    pub fn restore(&self, id: &str) -> SmartDeskResult<DateTime<Utc>> {
        self.set_trashed(id, false)
    }

    /// Remove the record from the server and from local state.
    pub async fn purge(&self, id: &str) -> SmartDeskResult<()> {
        self.adapter.hard_delete(id).await?;
        self.state.send_if_modified(|items| {
            let before = items.len();
            items.retain(|e| e.id() != id);
            items.len() != before
        });
        Ok(())
    }

    /// Push every unsynced record. Upserts run concurrently and fail independently;
    /// a failed record stays pending for the next call.
    pub async fn sync_pending(&self) -> SyncReport {
        let table = self.table();
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!("{} push skipped, sync already running", table);
            return SyncReport::skipped(table, SyncDirection::Push);
        };

        let pending: Vec<T> = self
            .state
            .borrow()
            .iter()
            .filter(|e| !e.base().is_synced)
            .cloned()
            .collect();

        let results = join_all(pending.iter().map(|entity| async move {
            (
                entity.id().to_string(),
                entity.base().updated_at,
                self.adapter.upsert(entity).await,
            )
        }))
        .await;

        let mut report = SyncReport::new(table, SyncDirection::Push);
        for (id, pushed_at, result) in results {
            match result {
                Ok(confirmed) => {
                    self.accept_confirmed(&id, pushed_at, confirmed);
                    report.outcomes.push(ItemOutcome::ok(id));
                }
                Err(e) => {
                    tracing::warn!("Failed to sync {} {}: {}", table, id, e);
                    report.outcomes.push(ItemOutcome::failed(id, e.to_string()));
                }
            }
        }

        report
    }

    /// Replace local state with the server's, except where an unsynced local
    /// record is strictly newer. Unsynced records the server has never seen
    /// are kept; synced ones missing on the server were deleted remotely.
    pub async fn sync_from_server(&self) -> SyncReport {
        let table = self.table();
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!("{} pull skipped, sync already running", table);
            return SyncReport::skipped(table, SyncDirection::Pull);
        };

        let fetched = match self.adapter.fetch_rows().await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!("{}", e);
                return SyncReport::failed(table, SyncDirection::Pull, e.to_string());
            }
        };

        let mut report = SyncReport::new(table, SyncDirection::Pull);
        self.state.send_modify(|items| {
            let local: Vec<T> = std::mem::take(items);
            let local_by_id: HashMap<&str, &T> = local.iter().map(|e| (e.id(), e)).collect();
            let mut seen: HashSet<String> = HashSet::new();

            // a row we could not read is not a remote delete
            for (id, reason) in fetched.unreadable {
                if let Some(mine) = local_by_id.get(id.as_str()) {
                    items.push((*mine).clone());
                }
                report.outcomes.push(ItemOutcome::failed(id.clone(), reason));
                seen.insert(id);
            }

            for server in fetched.records {
                seen.insert(server.id().to_string());
                match local_by_id.get(server.id()) {
                    Some(mine) if local_wins(*mine, &server) => {
                        tracing::debug!(
                            "Keeping local {} {} ({} > {})",
                            table,
                            mine.id(),
                            mine.base().updated_at,
                            server.base().updated_at
                        );
                        items.push((*mine).clone());
                        report.kept_local += 1;
                    }
                    _ => {
                        items.push(server);
                        report.pulled += 1;
                    }
                }
            }

            for mine in &local {
                if !seen.contains(mine.id()) && !mine.base().is_synced {
                    items.push(mine.clone());
                }
            }
        });

        report
    }

    /// Flag a record as acknowledged if nothing changed it since `at`.
    pub(crate) fn mark_synced(&self, id: &str, at: DateTime<Utc>) {
        self.state.send_if_modified(|items| {
            match items
                .iter_mut()
                .find(|e| e.id() == id && e.base().updated_at == at)
            {
                Some(entity) => {
                    entity.base_mut().is_synced = true;
                    true
                }
                None => false,
            }
        });
    }

    fn accept_confirmed(&self, id: &str, pushed_at: DateTime<Utc>, confirmed: T) {
        self.state.send_if_modified(|items| {
            match items.iter_mut().find(|e| e.id() == id) {
                // edited again while the upsert was in flight: stay pending
                Some(slot) if slot.base().updated_at == pushed_at => {
                    *slot = confirmed;
                    true
                }
                _ => false,
            }
        });
    }

    fn set_trashed(&self, id: &str, trashed: bool) -> SmartDeskResult<DateTime<Utc>> {
        let mut result = Err(SmartDeskError::NotFound(format!("{} {}", self.table(), id)));
        self.state.send_if_modified(|items| {
            let Some(entity) = items.iter_mut().find(|e| e.id() == id) else {
                return false;
            };
            let base = entity.base_mut();
            base.trashed = trashed;
            base.updated_at = next_timestamp(base.updated_at, Utc::now());
            base.is_synced = false;
            result = Ok(base.updated_at);
            true
        });
        result
    }

    fn merge_patch(
        &self,
        slot: &mut T,
        patch: Map<String, Value>,
        requested_at: DateTime<Utc>,
    ) -> SmartDeskResult<()> {
        let previous_at = slot.base().updated_at;
        let Value::Object(mut fields) = serde_json::to_value(&*slot)? else {
            return Err(self.invalid("record did not serialize to an object".into()));
        };

        for (key, value) in patch {
            if key != "id" {
                fields.insert(key, value);
            }
        }
        fields.insert("isSynced".into(), Value::Bool(false));

        let mut next: T =
            serde_json::from_value(Value::Object(fields)).map_err(|e| self.invalid(e.to_string()))?;
        next.base_mut().updated_at = next_timestamp(previous_at, requested_at);
        *slot = next;
        Ok(())
    }

    fn invalid(&self, message: String) -> SmartDeskError {
        SmartDeskError::InvalidPayload {
            entity: self.table().to_string(),
            message,
        }
    }
}

fn is_present(fields: &Map<String, Value>, key: &str) -> bool {
    fields.get(key).is_some_and(|v| !v.is_null())
}

/// `updated_at` must strictly increase on every local mutation.
fn next_timestamp(previous: DateTime<Utc>, requested: DateTime<Utc>) -> DateTime<Utc> {
    requested.max(previous + Duration::milliseconds(1))
}

/// Last-write-wins: only an unsynced local record with a strictly greater
/// `updated_at` beats the server. Ties go to the server.
fn local_wins<T: Entity>(local: &T, server: &T) -> bool {
    !local.base().is_synced && local.base().updated_at > server.base().updated_at
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::entity::Task;
    use chrono::TimeZone;
    use serde_json::json;

    fn draft(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn jan(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap()
    }

    fn task_store(backend: &Arc<MemoryBackend>) -> EntityStore<Task, MemoryBackend> {
        EntityStore::new(backend.clone())
    }

    #[test]
    fn add_without_created_at_fails_before_any_network_call() {
        let backend = Arc::new(MemoryBackend::signed_in("u1"));
        let store = task_store(&backend);

        let err = store
            .add(draft(json!({"title": "x", "columnId": "todo"})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing createdAt");
        assert_eq!(backend.call_count(), 0);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn add_checks_required_fields() {
        let backend = Arc::new(MemoryBackend::signed_in("u1"));
        let store = task_store(&backend);

        let err = store
            .add(draft(json!({"title": "x", "columnId": null, "createdAt": jan(1)})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing columnId");
    }

    #[test]
    fn add_is_optimistic_and_unsynced() {
        let backend = Arc::new(MemoryBackend::signed_in("u1"));
        let store = task_store(&backend);
        let mut rx = store.subscribe();

        let id = store
            .add(draft(json!({"title": "Write report", "columnId": "todo", "createdAt": jan(1)})))
            .unwrap();

        assert!(rx.has_changed().unwrap());
        let task = rx.borrow_and_update().iter().find(|t| t.base.id == id).cloned().unwrap();
        assert!(!task.base.is_synced);
        assert!(!task.base.trashed);
        assert_eq!(task.base.updated_at, jan(1));
        assert_eq!(task.quantity_target, 1);
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn update_requires_updated_at_and_keeps_timestamps_increasing() {
        let backend = Arc::new(MemoryBackend::signed_in("u1"));
        let store = task_store(&backend);
        let id = store
            .add(draft(json!({"title": "a", "columnId": "todo", "createdAt": jan(5)})))
            .unwrap();

        let err = store.update(&id, draft(json!({"title": "b"}))).unwrap_err();
        assert_eq!(err.to_string(), "Missing updatedAt");

        // a stale clock must not move updated_at backwards
        store
            .update(&id, draft(json!({"title": "b", "updatedAt": jan(1)})))
            .unwrap();
        let task = store.get(&id).unwrap();
        assert_eq!(task.title, "b");
        assert_eq!(task.base.updated_at, jan(5) + Duration::milliseconds(1));
        assert!(!task.base.is_synced);
    }

    #[test]
    fn soft_delete_and_restore() {
        let backend = Arc::new(MemoryBackend::signed_in("u1"));
        let store = task_store(&backend);
        let id = store
            .add(draft(json!({"title": "a", "columnId": "todo", "createdAt": jan(1)})))
            .unwrap();

        let deleted_at = store.soft_delete(&id).unwrap();
        assert!(store.get(&id).unwrap().base.trashed);
        let restored_at = store.restore(&id).unwrap();
        assert!(restored_at > deleted_at);
        assert!(!store.get(&id).unwrap().base.trashed);

        assert!(matches!(store.soft_delete("nope"), Err(SmartDeskError::NotFound(_))));
    }

    #[tokio::test]
    async fn sync_pending_marks_acknowledged_records_and_isolates_failures() {
        let backend = Arc::new(MemoryBackend::signed_in("u1"));
        let store = task_store(&backend);
        let good = store
            .add(draft(json!({"id": "good", "title": "a", "columnId": "todo", "createdAt": jan(1)})))
            .unwrap();
        let bad = store
            .add(draft(json!({"id": "bad", "title": "b", "columnId": "todo", "createdAt": jan(1)})))
            .unwrap();
        backend.fail_id(&bad);

        let report = store.sync_pending().await;

        assert_eq!(report.succeeded().count(), 1);
        let failed: Vec<_> = report.failures().map(|o| o.id.clone()).collect();
        assert_eq!(failed, vec![bad.clone()]);
        assert!(store.get(&good).unwrap().base.is_synced);
        assert!(!store.get(&bad).unwrap().base.is_synced);

        backend.clear_failures();
        let report = store.sync_pending().await;
        assert!(report.is_clean());
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn sync_pending_without_session_reports_auth_failure() {
        let backend = Arc::new(MemoryBackend::new());
        let store = task_store(&backend);
        store
            .add(draft(json!({"title": "a", "columnId": "todo", "createdAt": jan(1)})))
            .unwrap();

        let report = store.sync_pending().await;
        assert_eq!(report.first_error(), Some("User not authenticated"));
        assert_eq!(store.pending_count(), 1);
    }

    #[tokio::test]
    async fn newer_unsynced_local_record_survives_pull() {
        let backend = Arc::new(MemoryBackend::signed_in("u1"));
        backend.insert_row(
            "tasks",
            draft(json!({
                "id": "t1",
                "created_at": "2025-01-01T00:00:00Z",
                "updated_at": jan(1),
                "title": "server title",
                "column_id": "todo"
            })),
        );
        let store = task_store(&backend);
        store
            .add(draft(json!({
                "id": "t1",
                "title": "local title",
                "columnId": "todo",
                "createdAt": "2025-01-01T00:00:00Z",
                "updatedAt": jan(2)
            })))
            .unwrap();

        let report = store.sync_from_server().await;

        assert_eq!(report.kept_local, 1);
        let task = store.get("t1").unwrap();
        assert_eq!(task.title, "local title");
        assert_eq!(task.base.updated_at, jan(2));
        assert!(!task.base.is_synced);
    }

    #[tokio::test]
    async fn pull_prefers_server_on_older_local_or_tie() {
        let backend = Arc::new(MemoryBackend::signed_in("u1"));
        for (id, title) in [("older", "server"), ("tie", "server")] {
            backend.insert_row(
                "tasks",
                draft(json!({
                    "id": id,
                    "created_at": "2025-01-01T00:00:00Z",
                    "updated_at": jan(3),
                    "title": title,
                    "column_id": "todo"
                })),
            );
        }
        let store = task_store(&backend);
        for (id, at) in [("older", jan(2)), ("tie", jan(3))] {
            store
                .add(draft(json!({
                    "id": id,
                    "title": "local",
                    "columnId": "todo",
                    "createdAt": "2025-01-01T00:00:00Z",
                    "updatedAt": at
                })))
                .unwrap();
        }

        store.sync_from_server().await;

        for id in ["older", "tie"] {
            let task = store.get(id).unwrap();
            assert_eq!(task.title, "server");
            assert!(task.base.is_synced);
        }
    }

    #[tokio::test]
    async fn pull_keeps_local_only_pending_and_drops_remotely_deleted() {
        let backend = Arc::new(MemoryBackend::signed_in("u1"));
        let store = task_store(&backend);
        let synced = store
            .add(draft(json!({"title": "synced", "columnId": "todo", "createdAt": jan(1)})))
            .unwrap();
        store.sync_pending().await;

        // deleted on another device
        store.adapter().hard_delete(&synced).await.unwrap();
        let pending = store
            .add(draft(json!({"title": "new", "columnId": "todo", "createdAt": jan(2)})))
            .unwrap();

        let report = store.sync_from_server().await;
        assert!(report.is_clean());
        assert!(store.get(&synced).is_none());
        assert!(store.get(&pending).is_some());
    }

    #[tokio::test]
    async fn pull_keeps_synced_record_whose_optional_columns_went_null() {
        let backend = Arc::new(MemoryBackend::signed_in("u1"));
        let store = task_store(&backend);
        let id = store
            .add(draft(json!({
                "title": "tagged",
                "columnId": "todo",
                "tagIds": ["t"],
                "description": "d",
                "createdAt": jan(1)
            })))
            .unwrap();
        store.sync_pending().await;

        backend
            .update(
                "tasks",
                &id,
                draft(json!({"tag_ids": null, "description": null, "planned_date": null})),
            )
            .await
            .unwrap();

        let report = store.sync_from_server().await;
        assert!(report.is_clean());
        assert_eq!(report.pulled, 1);
        let task = store.get(&id).unwrap();
        assert!(task.tag_ids.is_empty());
        assert_eq!(task.description, None);
    }

    #[tokio::test]
    async fn unreadable_server_row_keeps_local_copy_and_is_reported() {
        let backend = Arc::new(MemoryBackend::signed_in("u1"));
        let store = task_store(&backend);
        let id = store
            .add(draft(json!({"title": "counted", "columnId": "todo", "createdAt": jan(1)})))
            .unwrap();
        store.sync_pending().await;

        backend
            .update("tasks", &id, draft(json!({"quantity_done": "abc"})))
            .await
            .unwrap();

        let report = store.sync_from_server().await;
        assert!(!report.is_clean());
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.pulled, 0);
        assert_eq!(store.get(&id).unwrap().title, "counted");
    }

    #[tokio::test]
    async fn pull_failure_is_reported_not_thrown() {
        let backend = Arc::new(MemoryBackend::signed_in("u1"));
        backend.fail_table("tasks");
        let store = task_store(&backend);

        let report = store.sync_from_server().await;
        assert!(report.first_error().unwrap().starts_with("Failed to fetch tasks"));
    }

    #[tokio::test]
    async fn overlapping_sync_is_skipped() {
        let backend = Arc::new(MemoryBackend::signed_in("u1"));
        let store = task_store(&backend);

        let _held = store.in_flight.try_lock().unwrap();
        assert!(store.sync_pending().await.skipped);
        assert!(store.sync_from_server().await.skipped);
    }

    #[tokio::test]
    async fn purge_removes_everywhere() {
        let backend = Arc::new(MemoryBackend::signed_in("u1"));
        let store = task_store(&backend);
        let id = store
            .add(draft(json!({"title": "a", "columnId": "todo", "createdAt": jan(1)})))
            .unwrap();
        store.sync_pending().await;

        store.purge(&id).await.unwrap();
        assert!(store.get(&id).is_none());
        assert!(backend.rows("tasks").is_empty());
    }
}
