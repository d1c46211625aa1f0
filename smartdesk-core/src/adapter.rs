//! Generic record ↔ row mapping and CRUD against one remote table.
//!
//! Columns travel as snake_case with ISO-8601 dates; records are camelCase.
//! Columns the adapter does not know about go through the same generic
//! snake→camel pass, so the adapter stays schema-agnostic.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::backend::{Row, TableBackend};
use crate::entity::case::{camel_to_snake, snake_to_camel};
use crate::entity::{BASE_FIELDS, Entity, TableSchema};
use crate::error::{SmartDeskError, SmartDeskResult};

/// Result of a full-table read.
#[derive(Debug)]
pub struct FetchedRows<T> {
    pub records: Vec<T>,
    /// Ids of rows that did not map onto the record type, with the reason.
    pub unreadable: Vec<(String, String)>,
}

pub struct EntityAdapter<T: Entity, B: TableBackend> {
    backend: Arc<B>,
    schema: TableSchema,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, B: TableBackend> EntityAdapter<T, B> {
    pub fn new(backend: Arc<B>) -> Self {
        EntityAdapter {
            backend,
            schema: T::schema(),
            _entity: PhantomData,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn table(&self) -> &'static str {
        self.schema.table
    }

    /// All rows visible to the current session. Rows that no longer map onto
    /// the record type are skipped with a warning.
    pub async fn fetch_all(&self) -> SmartDeskResult<Vec<T>> {
        Ok(self.fetch_rows().await?.records)
    }

    /// Like [`fetch_all`](Self::fetch_all), but also names the rows that
    /// could not be read so callers can leave their local copies alone.
    pub async fn fetch_rows(&self) -> SmartDeskResult<FetchedRows<T>> {
        let table = self.table();
        let rows = self
            .backend
            .select_all(table)
            .await
            .map_err(|e| SmartDeskError::backend(table, format!("Failed to fetch {table}: {e}")))?;

        let mut fetched = FetchedRows {
            records: Vec::with_capacity(rows.len()),
            unreadable: Vec::new(),
        };
        for row in rows {
            let id = row.get("id").and_then(Value::as_str).map(str::to_string);
            match self.from_row(row) {
                Ok(entity) => fetched.records.push(entity),
                Err(e) => {
                    tracing::warn!("Skipping unreadable {} row: {}", table, e);
                    if let Some(id) = id {
                        fetched.unreadable.push((id, e.to_string()));
                    }
                }
            }
        }
        Ok(fetched)
    }

    /// Push `entity` and return the server-confirmed version.
    pub async fn upsert(&self, entity: &T) -> SmartDeskResult<T> {
        let table = self.table();
        let user_id = if self.schema.user_scoped {
            Some(
                self.backend
                    .current_user_id()
                    .ok_or(SmartDeskError::NotAuthenticated)?,
            )
        } else {
            None
        };

        let row = self.to_row(entity, user_id.as_deref())?;
        let stored = self
            .backend
            .upsert(table, row, self.schema.conflict_key)
            .await
            .map_err(|e| SmartDeskError::backend(table, format!("Failed to upsert {table}: {e}")))?;

        self.from_row(stored)
    }

    pub async fn soft_delete(&self, id: &str, updated_at: DateTime<Utc>) -> SmartDeskResult<()> {
        let table = self.table();
        let mut patch = Map::new();
        patch.insert("trashed".into(), Value::Bool(true));
        patch.insert("updated_at".into(), Value::String(format_instant(updated_at)));

        self.backend.update(table, id, patch).await.map_err(|e| {
            SmartDeskError::backend(table, format!("Failed to soft delete {table} {id}: {e}"))
        })
    }

    pub async fn hard_delete(&self, id: &str) -> SmartDeskResult<()> {
        let table = self.table();
        self.backend
            .delete(table, id)
            .await
            .map_err(|e| SmartDeskError::backend(table, format!("Failed to delete {table} {id}: {e}")))
    }

    /// Map a server row onto the record type. Server rows are synced by definition.
    pub fn from_row(&self, row: Row) -> SmartDeskResult<T> {
        let mut record = Map::new();

        for field in ["id", "trashed", "createdAt", "updatedAt"] {
            let column = camel_to_snake(field);
            if let Some(value) = row.get(&column) {
                let value = if self.schema.is_date_field(field) {
                    normalize_date(value.clone())
                } else {
                    value.clone()
                };
                record.insert(field.to_string(), value);
            }
        }
        if !matches!(record.get("trashed"), Some(Value::Bool(_))) {
            record.insert("trashed".into(), Value::Bool(false));
        }
        record.insert("isSynced".into(), Value::Bool(true));

        // Unset nullable columns come back as null; let the record's defaults apply.
        for (column, value) in row {
            let field = snake_to_camel(&column);
            if value.is_null()
                || BASE_FIELDS.contains(&field.as_str())
                || self.schema.is_excluded(&field)
            {
                continue;
            }
            let value = if self.schema.is_date_field(&field) {
                normalize_date(value)
            } else {
                value
            };
            record.insert(field, value);
        }

        serde_json::from_value(Value::Object(record)).map_err(|e| SmartDeskError::InvalidPayload {
            entity: self.table().to_string(),
            message: e.to_string(),
        })
    }

    /// Serialize a record into a row: snake_case columns, ISO dates, trimmed strings.
    pub fn to_row(&self, entity: &T, user_id: Option<&str>) -> SmartDeskResult<Row> {
        let Value::Object(fields) = serde_json::to_value(entity)? else {
            return Err(SmartDeskError::InvalidPayload {
                entity: self.table().to_string(),
                message: "record did not serialize to an object".into(),
            });
        };

        let mut row = Row::new();
        for (field, value) in fields {
            if self.schema.is_excluded(&field) {
                continue;
            }
            let value = if self.schema.is_date_field(&field) {
                normalize_date(value)
            } else {
                trim_string(value)
            };
            row.insert(camel_to_snake(&field), value);
        }

        if let Some(user_id) = user_id {
            row.insert("user_id".into(), Value::String(user_id.to_string()));
        }

        Ok(row)
    }
}

fn format_instant(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Canonicalise a date value to RFC 3339 UTC. Accepts RFC 3339, Postgres
/// `timestamptz` text, naive datetimes (read as UTC) and bare dates.
/// Anything unparseable becomes `null`.
fn normalize_date(value: Value) -> Value {
    let Value::String(raw) = value else {
        return Value::Null;
    };
    let raw = raw.trim();

    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z").map(|dt| dt.with_timezone(&Utc))
        })
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc())
        });

    match parsed {
        Some(dt) => Value::String(format_instant(dt)),
        None => Value::Null,
    }
}

fn trim_string(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        other => other,
    }
}
