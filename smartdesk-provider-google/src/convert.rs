use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use smartdesk_core::ics::IcsTime;
use smartdesk_core::{CalendarRef, Event, EventOrigin};

use crate::types::{EventDateTime, GoogleCalendar, GoogleEvent};

impl From<&GoogleCalendar> for CalendarRef {
    fn from(calendar: &GoogleCalendar) -> Self {
        CalendarRef {
            id: calendar.id.clone(),
            name: calendar.display_name().to_string(),
            color: calendar.background_color.clone(),
        }
    }
}

fn resolve(time: &EventDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    if let Some(dt) = time.date_time {
        return Some(dt.with_timezone(&Utc));
    }
    time.date.and_then(|d| IcsTime::Date(d).resolve(tz))
}

/// Convert an API event into an [`Event`] tagged with its calendar.
///
/// Cancelled events, events without usable times and events ending before
/// they start are dropped. All-day dates are pinned to midnight in `tz`.
pub fn from_google(event: GoogleEvent, calendar: &CalendarRef, tz: Tz) -> Option<Event> {
    if event.status.as_deref() == Some("cancelled") {
        return None;
    }

    let start_raw = event.start.as_ref()?;
    let end_raw = event.end.as_ref()?;
    let start = resolve(start_raw, tz)?;
    let end = resolve(end_raw, tz)?;
    if end < start {
        tracing::debug!("Dropping Google event {} ending before it starts", event.id);
        return None;
    }

    let attendees = event.attendees.iter().filter(|a| !a.resource).count();
    let title = event
        .summary
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "(No title)".to_string());

    let mut converted = Event::new(event.id, title, start, end).with_source(EventOrigin::Google);
    converted.all_day = start_raw.date_time.is_none() && start_raw.date.is_some();
    converted.description = event.description;
    converted.location = event.location;
    converted.attendee_count = (attendees > 0).then_some(attendees as u32);
    converted.calendar = Some(calendar.clone());
    converted.updated_at = event.updated;
    Some(converted)
}
