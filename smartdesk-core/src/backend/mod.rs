//! Remote table access.
//!
//! The backend speaks in raw JSON rows with snake_case columns. Mapping rows
//! to records is the adapter's job (see [`crate::adapter`]).

mod memory;
mod rest;

pub use memory::MemoryBackend;
pub use rest::{RestBackend, RestSession};

use std::future::Future;

use serde_json::{Map, Value};

/// A table row as sent to or received from the backend.
pub type Row = Map<String, Value>;

/// Failure reported by a backend, before the adapter adds table context.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// The backend refused the request or answered with something unusable.
    #[error("{0}")]
    Rejected(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// CRUD over remote tables. Row-level security is enforced server-side, so
/// `select_all` returns whatever the current session may see.
pub trait TableBackend: Send + Sync + 'static {
    /// Id of the signed-in user, if any.
    fn current_user_id(&self) -> Option<String>;

    fn select_all(&self, table: &str) -> impl Future<Output = BackendResult<Vec<Row>>> + Send;

    /// Insert or merge `row`, resolving conflicts on `on_conflict`. Returns the stored row.
    fn upsert(
        &self,
        table: &str,
        row: Row,
        on_conflict: &str,
    ) -> impl Future<Output = BackendResult<Row>> + Send;

    fn update(&self, table: &str, id: &str, patch: Row) -> impl Future<Output = BackendResult<()>> + Send;

    fn delete(&self, table: &str, id: &str) -> impl Future<Output = BackendResult<()>> + Send;
}
