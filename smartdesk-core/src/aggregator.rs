//! One event list per view, drawn from local records and both providers.

use std::collections::HashSet;

use tokio::sync::watch;

use crate::date_range::DateRange;
use crate::entity::EventRecord;
use crate::error::{SmartDeskError, SmartDeskResult};
use crate::event::{Event, EventOrigin};
use crate::event_cache::is_event_overlapping_range;
use crate::feed::{EventFeed, EventSource};

/// Merge local, Google and ICS events for `range`.
///
/// Local events win over any remote event with the same raw id. Remote
/// events are added only when their id is not taken yet, Google before ICS.
/// Trashed local events and anything outside `range` are dropped, and the
/// result is sorted by start, then title, then id.
pub fn combine_events(local: &[Event], google: &[Event], ics: &[Event], range: &DateRange) -> Vec<Event> {
    let mut taken: HashSet<&str> = HashSet::new();
    let mut combined: Vec<Event> = Vec::with_capacity(local.len() + google.len() + ics.len());

    for event in local {
        taken.insert(event.id.as_str());
        combined.push(event.clone());
    }

    for (events, origin) in [(google, EventOrigin::Google), (ics, EventOrigin::Ics)] {
        for event in events {
            if taken.insert(event.id.as_str()) {
                combined.push(event.clone().with_source(origin));
            }
        }
    }

    combined.retain(|e| !e.trashed && is_event_overlapping_range(e, range));
    combined.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.id.cmp(&b.id))
    });
    combined
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedEventsView {
    pub data: Vec<Event>,
    /// Some provider has nothing to show yet and is fetching.
    pub is_loading: bool,
    pub is_fetching: bool,
    /// First provider error, Google before ICS.
    pub error: Option<String>,
    pub needs_sign_in: bool,
}

/// Outcome of a combined refetch. Each provider settles on its own.
#[derive(Debug)]
pub struct RefetchOutcome {
    pub google: SmartDeskResult<()>,
    pub ics: SmartDeskResult<()>,
}

impl RefetchOutcome {
    pub fn first_error(&self) -> Option<&SmartDeskError> {
        self.google.as_ref().err().or(self.ics.as_ref().err())
    }
}

pub struct CombinedEvents<G: EventSource, I: EventSource> {
    local: watch::Receiver<Vec<EventRecord>>,
    google: EventFeed<G>,
    ics: EventFeed<I>,
}

impl<G: EventSource, I: EventSource> CombinedEvents<G, I> {
    pub fn new(local: watch::Receiver<Vec<EventRecord>>, google: EventFeed<G>, ics: EventFeed<I>) -> Self {
        CombinedEvents { local, google, ics }
    }

    pub fn google(&self) -> &EventFeed<G> {
        &self.google
    }

    pub fn ics(&self) -> &EventFeed<I> {
        &self.ics
    }

    /// Current view from whatever is cached. Never fetches.
    pub fn query(&self, range: &DateRange) -> CombinedEventsView {
        let local: Vec<Event> = self.local.borrow().iter().map(EventRecord::to_event).collect();
        let data = combine_events(
            &local,
            &self.google.range_view(range),
            &self.ics.range_view(range),
            range,
        );

        let google = self.google.status();
        let ics = self.ics.status();
        CombinedEventsView {
            data,
            is_loading: google.is_loading() || ics.is_loading(),
            is_fetching: google.is_fetching || ics.is_fetching,
            error: google.error.or(ics.error),
            needs_sign_in: google.needs_sign_in || ics.needs_sign_in,
        }
    }

    /// Fetch whichever providers need it for `range`, then build the view.
    pub async fn load(&self, range: &DateRange) -> CombinedEventsView {
        let google = async {
            if self.google.needs_fetch(range) {
                if let Err(e) = self.google.refetch(range).await {
                    tracing::debug!("Google refetch failed: {}", e);
                }
            }
        };
        let ics = async {
            if self.ics.needs_fetch(range) {
                if let Err(e) = self.ics.refetch(range).await {
                    tracing::debug!("ICS refetch failed: {}", e);
                }
            }
        };
        tokio::join!(google, ics);
        self.query(range)
    }

    /// Refetch both providers concurrently.
    pub async fn refetch(&self, range: &DateRange) -> RefetchOutcome {
        let (google, ics) = tokio::join!(self.google.refetch(range), self.ics.refetch(range));
        RefetchOutcome { google, ics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Base;
    use crate::error::ProviderErrorKind;
    use crate::feed::FeedOptions;
    use crate::feed::tests::{FakeSource, event_on};
    use crate::retry::RetryPolicy;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn june() -> DateRange {
        DateRange::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap(),
        )
    }

    fn record(id: &str, title: &str, day: u32, trashed: bool) -> EventRecord {
        let start = Utc.with_ymd_and_hms(2025, 6, day, 9, 0, 0).unwrap();
        EventRecord {
            base: Base {
                id: id.into(),
                trashed,
                created_at: start,
                updated_at: start,
                is_synced: true,
            },
            title: title.into(),
            start,
            end: start + chrono::Duration::hours(1),
            all_day: false,
            description: None,
            location: None,
        }
    }

    fn feed(origin: EventOrigin, events: Vec<Event>) -> EventFeed<FakeSource> {
        EventFeed::new(
            FakeSource::new(origin, events),
            FeedOptions {
                retry: RetryPolicy::never(),
                ..FeedOptions::default()
            },
        )
    }

    #[test]
    fn local_event_shadows_remote_with_same_id() {
        let local = vec![record("shared", "Mine", 5, false).to_event()];
        let google = vec![event_on("shared", 5), event_on("g-only", 6)];

        let combined = combine_events(&local, &google, &[], &june());

        let titles: Vec<&str> = combined.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Mine", "g-only"]);
        assert_eq!(combined[0].source, None);
        assert_eq!(combined[1].source, Some(EventOrigin::Google));
    }

    #[test]
    fn trashed_local_events_are_hidden() {
        let local = vec![record("gone", "Deleted", 5, true).to_event()];
        assert!(combine_events(&local, &[], &[], &june()).is_empty());
    }

    #[test]
    fn sorted_by_start_then_title() {
        let ics = vec![event_on("b", 4), event_on("a", 4), event_on("c", 2)];
        let combined = combine_events(&[], &[], &ics, &june());
        let ids: Vec<&str> = combined.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn events_outside_range_are_dropped() {
        let mut late = event_on("late", 30);
        late.start = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
        late.end = late.start + chrono::Duration::hours(1);

        assert!(combine_events(&[], &[late], &[], &june()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn load_merges_all_three_sources() {
        let (_tx, rx) = watch::channel(vec![record("shared", "Local copy", 5, false)]);
        let combined = CombinedEvents::new(
            rx,
            feed(EventOrigin::Google, vec![event_on("shared", 5)]),
            feed(EventOrigin::Ics, vec![event_on("ics-1", 7)]),
        );

        let view = combined.load(&june()).await;

        let titles: Vec<&str> = view.data.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Local copy", "ics-1"]);
        assert!(!view.is_loading);
        assert_eq!(view.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_provider_does_not_hide_the_other() {
        let (_tx, rx) = watch::channel(Vec::new());
        let google = feed(EventOrigin::Google, vec![]);
        *google.source().fail_with.lock().unwrap() = Some(ProviderErrorKind::Auth);
        let combined = CombinedEvents::new(rx, google, feed(EventOrigin::Ics, vec![event_on("i", 3)]));

        let outcome = combined.refetch(&june()).await;
        let view = combined.query(&june());

        assert!(outcome.google.is_err());
        assert!(outcome.ics.is_ok());
        assert!(outcome.first_error().is_some_and(|e| e.is_auth_error()));
        assert_eq!(view.data.len(), 1);
        assert!(view.needs_sign_in);
        assert!(view.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn load_surfaces_provider_failure_in_view() {
        let (_tx, rx) = watch::channel(Vec::new());
        let ics = feed(EventOrigin::Ics, vec![]);
        *ics.source().fail_with.lock().unwrap() = Some(ProviderErrorKind::Auth);
        let combined = CombinedEvents::new(rx, feed(EventOrigin::Google, vec![event_on("g", 3)]), ics);

        let view = combined.load(&june()).await;

        assert_eq!(view.data.len(), 1);
        assert!(view.error.is_some());
        assert!(!view.is_fetching);
    }
}
