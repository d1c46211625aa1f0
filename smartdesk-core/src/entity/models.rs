//! Concrete Smart Desk records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Base, Entity, EntityRules, TableSchema};
use crate::event::{CalendarRef, Event};

fn default_target() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// A card on the task board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(flatten)]
    pub base: Base,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub column_id: String,
    #[serde(default)]
    pub quantity_done: u32,
    #[serde(default = "default_target")]
    pub quantity_target: u32,
    #[serde(default)]
    pub important: bool,
    #[serde(default)]
    pub urgent: bool,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub planned_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tag_ids: Vec<String>,
}

impl Task {
    pub fn is_complete(&self) -> bool {
        self.quantity_done >= self.quantity_target
    }
}

impl Entity for Task {
    fn schema() -> TableSchema {
        TableSchema::new("tasks").date_fields(&["plannedDate"])
    }

    fn rules() -> EntityRules {
        EntityRules::default()
            .required(&["title", "columnId"])
            .default_value("quantityDone", json!(0))
            .default_value("quantityTarget", json!(1))
            .default_value("important", json!(false))
            .default_value("urgent", json!(false))
            .default_value("blocked", json!(false))
    }

    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }
}

/// A board column tasks are sorted into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    #[serde(flatten)]
    pub base: Base,
    pub title: String,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub color: Option<String>,
}

impl Entity for Column {
    fn schema() -> TableSchema {
        TableSchema::new("columns")
    }

    fn rules() -> EntityRules {
        EntityRules::default()
            .required(&["title"])
            .default_value("position", json!(0))
    }

    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    #[serde(flatten)]
    pub base: Base,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl Entity for Tag {
    fn schema() -> TableSchema {
        TableSchema::new("tags")
    }

    fn rules() -> EntityRules {
        EntityRules::default().required(&["name"])
    }

    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(flatten)]
    pub base: Base,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub tag_ids: Vec<String>,
}

impl Entity for Note {
    fn schema() -> TableSchema {
        TableSchema::new("notes")
    }

    fn rules() -> EntityRules {
        EntityRules::default()
            .required(&["title"])
            .default_value("content", json!(""))
    }

    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(flatten)]
    pub base: Base,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Entity for Location {
    fn schema() -> TableSchema {
        TableSchema::new("locations")
    }

    fn rules() -> EntityRules {
        EntityRules::default().required(&["name"])
    }

    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }
}

/// A user-managed iCalendar feed subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IcsCalendar {
    #[serde(flatten)]
    pub base: Base,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl IcsCalendar {
    pub fn calendar_ref(&self) -> CalendarRef {
        CalendarRef {
            id: self.base.id.clone(),
            name: self.name.clone(),
            color: self.color.clone(),
        }
    }
}

impl Entity for IcsCalendar {
    fn schema() -> TableSchema {
        TableSchema::new("ics_calendars")
    }

    fn rules() -> EntityRules {
        EntityRules::default()
            .required(&["name", "url"])
            .default_value("enabled", json!(true))
    }

    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }
}

/// An uploaded file shown in the gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    #[serde(flatten)]
    pub base: Base,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size_bytes: u64,
    /// Signed download URL; minted per session and never stored.
    #[serde(default)]
    pub preview_url: Option<String>,
}

impl Entity for FileRecord {
    fn schema() -> TableSchema {
        TableSchema::new("files").exclude_fields(&["previewUrl"])
    }

    fn rules() -> EntityRules {
        EntityRules::default()
            .required(&["name", "path"])
            .default_value("sizeBytes", json!(0))
    }

    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }
}

/// A calendar event created or edited in Smart Desk itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(flatten)]
    pub base: Base,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl EventRecord {
    pub fn to_event(&self) -> Event {
        Event {
            id: self.base.id.clone(),
            title: self.title.clone(),
            start: self.start,
            end: self.end,
            all_day: self.all_day,
            description: self.description.clone(),
            location: self.location.clone(),
            attendee_count: None,
            calendar: None,
            source: None,
            updated_at: Some(self.base.updated_at),
            trashed: self.base.trashed,
        }
    }
}

impl Entity for EventRecord {
    fn schema() -> TableSchema {
        TableSchema::new("events").date_fields(&["start", "end"])
    }

    fn rules() -> EntityRules {
        EntityRules::default()
            .required(&["title", "start", "end"])
            .default_value("allDay", json!(false))
    }

    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }
}
