//! Entity store with a same-session mutation queue.
//!
//! The queue only batches rapid edits made before the next network round
//! trip. It lives in memory, is dropped on every flush whatever the outcome,
//! and is not an outbox: anything that fails stays unsynced in the store and
//! goes out with the next `sync_pending`.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::{Map, Value, json};

use super::{EntityStore, ItemOutcome, SyncDirection, SyncReport};
use crate::backend::TableBackend;
use crate::entity::Entity;
use crate::error::SmartDeskResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    Add,
    Update,
    Delete,
}

/// A local change not yet confirmed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub op: MutationOp,
    pub payload: Value,
    pub ts: DateTime<Utc>,
}

pub struct SyncedEntityStore<T: Entity, B: TableBackend> {
    store: EntityStore<T, B>,
    pending_mutations: Mutex<Vec<Mutation>>,
}

impl<T: Entity, B: TableBackend> SyncedEntityStore<T, B> {
    pub fn new(backend: Arc<B>) -> Self {
        SyncedEntityStore {
            store: EntityStore::new(backend),
            pending_mutations: Mutex::new(Vec::new()),
        }
    }

    /// Read access and direct sync verbs of the wrapped store.
    pub fn store(&self) -> &EntityStore<T, B> {
        &self.store
    }

    pub fn pending_mutations(&self) -> Vec<Mutation> {
        self.queue().clone()
    }

    pub fn add(&self, draft: Map<String, Value>) -> SmartDeskResult<String> {
        let payload = Value::Object(draft.clone());
        let id = self.store.add(draft)?;
        self.record(MutationOp::Add, payload);
        Ok(id)
    }

    pub fn update(&self, id: &str, patch: Map<String, Value>) -> SmartDeskResult<()> {
        let mut payload = patch.clone();
        self.store.update(id, patch)?;
        payload.insert("id".into(), Value::String(id.to_string()));
        self.record(MutationOp::Update, Value::Object(payload));
        Ok(())
    }

    pub fn soft_delete(&self, id: &str) -> SmartDeskResult<()> {
        let at = self.store.soft_delete(id)?;
        self.record(MutationOp::Delete, json!({ "id": id, "updatedAt": at }));
        Ok(())
    }

    pub fn restore(&self, id: &str) -> SmartDeskResult<()> {
        let at = self.store.restore(id)?;
        self.record(
            MutationOp::Update,
            json!({ "id": id, "trashed": false, "updatedAt": at }),
        );
        Ok(())
    }

    /// Push queued deletes through the soft-delete endpoint, then everything
    /// else still pending, then drop the queue regardless of outcome.
    pub async fn flush_queue(&self) -> SyncReport {
        let queued = std::mem::take(&mut *self.queue());

        let deletes: Vec<(String, DateTime<Utc>)> = queued
            .iter()
            .filter(|m| m.op == MutationOp::Delete)
            .filter_map(|m| {
                let id = m.payload.get("id")?.as_str()?.to_string();
                let at = serde_json::from_value(m.payload.get("updatedAt")?.clone()).ok()?;
                Some((id, at))
            })
            .collect();

        let delete_results = join_all(deletes.into_iter().map(|(id, at)| async move {
            let result = self.store.adapter().soft_delete(&id, at).await;
            (id, at, result)
        }))
        .await;

        let mut delete_outcomes = Vec::new();
        for (id, at, result) in delete_results {
            match result {
                Ok(()) => {
                    self.store.mark_synced(&id, at);
                    delete_outcomes.push(ItemOutcome::ok(id));
                }
                Err(e) => {
                    tracing::warn!("Queued delete of {} {} failed: {}", self.store.table(), id, e);
                    delete_outcomes.push(ItemOutcome::failed(id, e.to_string()));
                }
            }
        }

        let mut report = self.store.sync_pending().await;
        if report.skipped && !delete_outcomes.is_empty() {
            report = SyncReport::new(self.store.table(), SyncDirection::Push);
        }
        report.outcomes.splice(0..0, delete_outcomes);
        report
    }

    /// Push, then pull, so the pull never clobbers a change that was about to go out.
    pub async fn sync_now(&self) -> (SyncReport, SyncReport) {
        let pushed = self.flush_queue().await;
        let pulled = self.store.sync_from_server().await;
        (pushed, pulled)
    }

    fn record(&self, op: MutationOp, payload: Value) {
        self.queue().push(Mutation {
            op,
            payload,
            ts: Utc::now(),
        });
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, Vec<Mutation>> {
        self.pending_mutations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}
