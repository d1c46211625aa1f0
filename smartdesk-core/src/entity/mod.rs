//! Persisted record types and the metadata the adapter and stores need about them.

pub mod case;
mod models;

pub use models::{Column, EventRecord, FileRecord, IcsCalendar, Location, Note, Tag, Task};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields every persisted record carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Base {
    pub id: String,
    #[serde(default)]
    pub trashed: bool,
    pub created_at: DateTime<Utc>,
    /// Last local mutation. The only conflict-resolution key.
    pub updated_at: DateTime<Utc>,
    /// True once the server acknowledged the current local state.
    #[serde(default)]
    pub is_synced: bool,
}

/// Base fields the adapter maps itself, camelCase.
pub const BASE_FIELDS: &[&str] = &["id", "trashed", "createdAt", "updatedAt", "isSynced", "userId"];

/// How a record maps onto its remote table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub table: &'static str,
    /// camelCase fields holding instants, in addition to the base timestamps.
    pub date_fields: &'static [&'static str],
    /// camelCase fields that never travel to or from the server.
    pub exclude_fields: &'static [&'static str],
    /// Rows carry a `user_id` owner column.
    pub user_scoped: bool,
    /// Column the upsert resolves conflicts on.
    pub conflict_key: &'static str,
}

impl TableSchema {
    pub const fn new(table: &'static str) -> Self {
        TableSchema {
            table,
            date_fields: &[],
            exclude_fields: &[],
            user_scoped: true,
            conflict_key: "id",
        }
    }

    pub fn date_fields(mut self, fields: &'static [&'static str]) -> Self {
        self.date_fields = fields;
        self
    }

    pub fn exclude_fields(mut self, fields: &'static [&'static str]) -> Self {
        self.exclude_fields = fields;
        self
    }

    pub fn shared(mut self) -> Self {
        self.user_scoped = false;
        self
    }

    pub fn is_date_field(&self, camel: &str) -> bool {
        camel == "createdAt" || camel == "updatedAt" || self.date_fields.contains(&camel)
    }

    pub fn is_excluded(&self, camel: &str) -> bool {
        camel == "isSynced" || self.exclude_fields.contains(&camel)
    }
}

/// Construction rules applied by `EntityStore::add`.
#[derive(Debug, Clone, Default)]
pub struct EntityRules {
    /// camelCase fields that must be present and non-null in an add draft.
    pub required_fields: Vec<&'static str>,
    /// Values filled in when the draft leaves them out.
    pub defaults: Map<String, Value>,
}

impl EntityRules {
    pub fn required(mut self, fields: &[&'static str]) -> Self {
        self.required_fields.extend_from_slice(fields);
        self
    }

    pub fn default_value(mut self, field: &str, value: Value) -> Self {
        self.defaults.insert(field.to_string(), value);
        self
    }
}

/// A typed record stored in a remote table and mirrored in an entity store.
pub trait Entity: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn schema() -> TableSchema;

    fn rules() -> EntityRules {
        EntityRules::default()
    }

    fn base(&self) -> &Base;

    fn base_mut(&mut self) -> &mut Base;

    fn id(&self) -> &str {
        &self.base().id
    }
}
