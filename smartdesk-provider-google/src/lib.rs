//! Google Calendar event source for Smart Desk.
//!
//! Lists the signed-in user's calendars, then fetches the expanded events of
//! every calendar for the requested window concurrently. A calendar that
//! fails is logged and skipped; failing to list calendars at all (an expired
//! session, most often) is returned so the feed can ask for a sign-in.

mod client;
mod convert;
mod error;
mod types;

use chrono_tz::Tz;
use futures::future::join_all;
use smartdesk_core::{CalendarRef, DateRange, Event, EventOrigin, EventSource, SmartDeskResult};

pub use client::{DEFAULT_API_BASE, GoogleApi, GoogleCalendarClient};
pub use convert::from_google;
pub use error::GoogleCalendarError;
pub use types::{EventDateTime, GoogleAttendee, GoogleCalendar, GoogleEvent};

pub struct GoogleEventSource<A: GoogleApi> {
    api: A,
    tz: Tz,
}

impl<A: GoogleApi> GoogleEventSource<A> {
    pub fn new(api: A, tz: Tz) -> Self {
        GoogleEventSource { api, tz }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    async fn calendar_events(&self, calendar: &GoogleCalendar, range: &DateRange) -> Vec<Event> {
        let calendar_ref = CalendarRef::from(calendar);
        match self.api.list_events(&calendar.id, range).await {
            Ok(events) => events
                .into_iter()
                .filter_map(|e| from_google(e, &calendar_ref, self.tz))
                .collect(),
            Err(e) => {
                tracing::warn!(calendar = %calendar.id, "Skipping Google calendar: {}", e);
                Vec::new()
            }
        }
    }
}

impl<A: GoogleApi> EventSource for GoogleEventSource<A> {
    fn origin(&self) -> EventOrigin {
        EventOrigin::Google
    }

    async fn events_in_range(&self, range: &DateRange) -> SmartDeskResult<Vec<Event>> {
        let calendars = self.api.list_calendars().await?;
        tracing::debug!("Fetching {} Google calendars", calendars.len());

        let per_calendar = join_all(
            calendars
                .iter()
                .map(|calendar| self.calendar_events(calendar, range)),
        )
        .await;

        Ok(per_calendar.into_iter().flatten().collect())
    }
}
