//! iCalendar feed event source for Smart Desk.
//!
//! Feeds come from the user's `ics_calendars` records, watched live from the
//! entity store, plus any listed in the config file. Each feed is downloaded
//! and normalized on its own; one that fails contributes no events.

mod fetch;
mod normalize;

use chrono_tz::Tz;
use futures::future::join_all;
use smartdesk_core::config::IcsFeedConfig;
use smartdesk_core::entity::IcsCalendar;
use smartdesk_core::{CalendarRef, DateRange, Event, EventOrigin, EventSource, SmartDeskResult};
use tokio::sync::watch;

pub use fetch::{FeedFetcher, HttpFeedFetcher, normalize_feed_url};
pub use normalize::{normalize_feed, occurrence_id};

/// One feed to pull: where from, and how to label its events.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSubscription {
    pub calendar: CalendarRef,
    pub url: String,
}

impl FeedSubscription {
    /// `None` for trashed or disabled records.
    pub fn from_record(record: &IcsCalendar) -> Option<Self> {
        (!record.base.trashed && record.enabled).then(|| FeedSubscription {
            calendar: record.calendar_ref(),
            url: record.url.clone(),
        })
    }

    pub fn from_config(feed: &IcsFeedConfig) -> Self {
        FeedSubscription {
            calendar: CalendarRef {
                id: feed.url.clone(),
                name: feed.name.clone(),
                color: feed.color.clone(),
            },
            url: feed.url.clone(),
        }
    }
}

pub struct IcsEventSource<F: FeedFetcher> {
    fetcher: F,
    tz: Tz,
    records: Option<watch::Receiver<Vec<IcsCalendar>>>,
    configured: Vec<FeedSubscription>,
}

impl<F: FeedFetcher> IcsEventSource<F> {
    pub fn new(fetcher: F, tz: Tz) -> Self {
        IcsEventSource {
            fetcher,
            tz,
            records: None,
            configured: Vec::new(),
        }
    }

    /// Follow the feeds stored as `IcsCalendar` records.
    pub fn with_calendars(mut self, records: watch::Receiver<Vec<IcsCalendar>>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn with_feeds(mut self, feeds: &[IcsFeedConfig]) -> Self {
        self.configured
            .extend(feeds.iter().map(FeedSubscription::from_config));
        self
    }

    /// Active feeds right now; a URL listed twice is fetched once.
    pub fn subscriptions(&self) -> Vec<FeedSubscription> {
        let mut subscriptions: Vec<FeedSubscription> = self
            .records
            .as_ref()
            .map(|rx| rx.borrow().iter().filter_map(FeedSubscription::from_record).collect())
            .unwrap_or_default();
        for feed in &self.configured {
            if !subscriptions.iter().any(|s| s.url == feed.url) {
                subscriptions.push(feed.clone());
            }
        }
        subscriptions
    }

    async fn feed_events(&self, feed: &FeedSubscription, range: &DateRange) -> Vec<Event> {
        let result = match self.fetcher.fetch(&feed.url).await {
            Ok(content) => normalize_feed(&content, &feed.calendar, range, self.tz),
            Err(e) => Err(e),
        };
        match result {
            Ok(events) => {
                tracing::debug!(calendar = %feed.calendar.name, "{} ICS events", events.len());
                events
            }
            Err(e) => {
                tracing::warn!(calendar = %feed.calendar.name, "Skipping ICS feed: {}", e);
                Vec::new()
            }
        }
    }
}

impl<F: FeedFetcher> EventSource for IcsEventSource<F> {
    fn origin(&self) -> EventOrigin {
        EventOrigin::Ics
    }

    async fn events_in_range(&self, range: &DateRange) -> SmartDeskResult<Vec<Event>> {
        let subscriptions = self.subscriptions();
        let per_feed = join_all(subscriptions.iter().map(|feed| self.feed_events(feed, range))).await;
        Ok(per_feed.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use smartdesk_core::entity::Base;
    use smartdesk_core::{ProviderErrorKind, SmartDeskError};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeFetcher {
        bodies: HashMap<String, String>,
        fetched: Mutex<Vec<String>>,
    }

    impl FeedFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> SmartDeskResult<String> {
            self.fetched.lock().unwrap().push(url.to_string());
            self.bodies.get(url).cloned().ok_or_else(|| {
                SmartDeskError::provider("ics", ProviderErrorKind::NotFound, format!("{url} returned 404"))
            })
        }
    }

    fn feed_with(uid: &str, day: u32) -> String {
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\nBEGIN:VEVENT\r\nUID:{uid}\r\n\
             SUMMARY:{uid}\r\nDTSTART:202406{day:02}T090000Z\r\nDTEND:202406{day:02}T100000Z\r\n\
             END:VEVENT\r\nEND:VCALENDAR\r\n"
        )
    }

    fn record(id: &str, url: &str, trashed: bool, enabled: bool) -> IcsCalendar {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        IcsCalendar {
            base: Base {
                id: id.into(),
                trashed,
                created_at: now,
                updated_at: now,
                is_synced: true,
            },
            name: format!("Calendar {id}"),
            url: url.into(),
            color: Some("#ff8800".into()),
            enabled,
        }
    }

    fn june() -> DateRange {
        DateRange::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn failing_feed_contributes_nothing() {
        let fetcher = FakeFetcher {
            bodies: HashMap::from([("https://a.test/a.ics".to_string(), feed_with("a", 3))]),
            ..Default::default()
        };
        let (_tx, rx) = watch::channel(vec![
            record("a", "https://a.test/a.ics", false, true),
            record("b", "https://b.test/missing.ics", false, true),
        ]);
        let source = IcsEventSource::new(fetcher, chrono_tz::UTC).with_calendars(rx);

        let events = source.events_in_range(&june()).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "a");
        assert_eq!(events[0].calendar.as_ref().unwrap().name, "Calendar a");
        assert_eq!(source.fetcher.fetched.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn trashed_and_disabled_records_are_not_fetched() {
        let (_tx, rx) = watch::channel(vec![
            record("a", "https://a.test/a.ics", true, true),
            record("b", "https://b.test/b.ics", false, false),
        ]);
        let source = IcsEventSource::new(FakeFetcher::default(), chrono_tz::UTC).with_calendars(rx);

        let events = source.events_in_range(&june()).await.unwrap();

        assert!(events.is_empty());
        assert!(source.fetcher.fetched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_changes_are_picked_up() {
        let fetcher = FakeFetcher {
            bodies: HashMap::from([
                ("https://a.test/a.ics".to_string(), feed_with("a", 3)),
                ("https://c.test/c.ics".to_string(), feed_with("c", 4)),
            ]),
            ..Default::default()
        };
        let (tx, rx) = watch::channel(vec![record("a", "https://a.test/a.ics", false, true)]);
        let source = IcsEventSource::new(fetcher, chrono_tz::UTC)
            .with_calendars(rx)
            .with_feeds(&[IcsFeedConfig {
                name: "Configured".into(),
                url: "https://a.test/a.ics".into(),
                color: None,
            }]);

        assert_eq!(source.subscriptions().len(), 1);

        tx.send_modify(|records| records.push(record("c", "https://c.test/c.ics", false, true)));
        let mut ids: Vec<String> = source
            .events_in_range(&june())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "c"]);
    }
}
