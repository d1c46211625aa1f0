//! Source-neutral calendar event.
//!
//! Every provider converts its payloads into [`Event`], and the local event
//! store converts its records into it too. The cache utilities and the
//! aggregator only ever see this shape.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOrigin {
    Local,
    Google,
    Ics,
}

impl EventOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOrigin::Local => "local",
            EventOrigin::Google => "google",
            EventOrigin::Ics => "ics",
        }
    }
}

impl fmt::Display for EventOrigin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The calendar an event was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarRef {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendee_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar: Option<CalendarRef>,
    /// Set for provider events; `None` for local ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<EventOrigin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Only ever true for local events that were soft-deleted.
    #[serde(default)]
    pub trashed: bool,
}

impl Event {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Event {
            id: id.into(),
            title: title.into(),
            start,
            end,
            all_day: false,
            description: None,
            location: None,
            attendee_count: None,
            calendar: None,
            source: None,
            updated_at: None,
            trashed: false,
        }
    }

    pub fn with_source(mut self, source: EventOrigin) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    /// An event whose end precedes its start is malformed and never cached or shown.
    pub fn is_well_formed(&self) -> bool {
        self.end >= self.start
    }

    pub fn origin(&self) -> EventOrigin {
        self.source.unwrap_or(EventOrigin::Local)
    }
}
