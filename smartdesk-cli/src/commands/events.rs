use anyhow::Result;
use chrono_tz::Tz;
use owo_colors::OwoColorize;
use smartdesk_core::config::GoogleConfig;
use smartdesk_core::entity::{EventRecord, IcsCalendar};
use smartdesk_core::query_cache::PersistedCache;
use smartdesk_core::store::EntityStore;
use smartdesk_core::{
    CombinedEvents, DateRange, Event, EventFeed, EventOrigin, EventSource, SmartDeskResult,
};
use smartdesk_provider_google::{GoogleCalendarClient, GoogleCalendarError, GoogleEventSource};
use smartdesk_provider_ics::{HttpFeedFetcher, IcsEventSource};
use tokio::sync::watch;

use crate::app::App;
use crate::render::{Render, RenderInZone};

/// Google is optional: without a token every fetch asks for a sign-in.
enum GoogleSource {
    Connected(GoogleEventSource<GoogleCalendarClient>),
    SignedOut,
}

impl GoogleSource {
    fn from_config(config: &GoogleConfig, tz: Tz) -> Result<Self> {
        match GoogleCalendarClient::from_config(config) {
            Ok(client) => Ok(GoogleSource::Connected(GoogleEventSource::new(client, tz))),
            Err(GoogleCalendarError::MissingToken) => Ok(GoogleSource::SignedOut),
            Err(e) => Err(e.into()),
        }
    }
}

impl EventSource for GoogleSource {
    fn origin(&self) -> EventOrigin {
        EventOrigin::Google
    }

    async fn events_in_range(&self, range: &DateRange) -> SmartDeskResult<Vec<Event>> {
        match self {
            GoogleSource::Connected(source) => source.events_in_range(range).await,
            GoogleSource::SignedOut => Err(GoogleCalendarError::MissingToken.into()),
        }
    }
}

pub async fn run(app: &App, range: DateRange, offline: bool) -> Result<()> {
    let cache = app.config.persisted_cache()?;

    let (local_tx, local_rx) = watch::channel(Vec::<EventRecord>::new());
    let (calendars_tx, calendars_rx) = watch::channel(Vec::<IcsCalendar>::new());
    if !offline {
        if let Some(backend) = app.backend()? {
            let events = EntityStore::<EventRecord, _>::new(backend.clone());
            let calendars = EntityStore::<IcsCalendar, _>::new(backend);
            let (events_report, calendars_report) =
                tokio::join!(events.sync_from_server(), calendars.sync_from_server());
            for report in [&events_report, &calendars_report] {
                if !report.is_clean() {
                    eprintln!("{}", report.render());
                }
            }
            local_tx.send_replace(events.snapshot());
            calendars_tx.send_replace(calendars.snapshot());
        }
    }

    let google = GoogleSource::from_config(&app.config.google, app.tz)?;
    let ics = IcsEventSource::new(HttpFeedFetcher::new()?, app.tz)
        .with_calendars(calendars_rx)
        .with_feeds(&app.config.ics.feeds);

    let google_feed = EventFeed::new(google, app.config.google_feed_options()?);
    let ics_feed = EventFeed::new(ics, app.config.ics_feed_options()?);
    google_feed.warm_start(&cache);
    ics_feed.warm_start(&cache);

    let combined = CombinedEvents::new(local_rx, google_feed, ics_feed);
    let view = if offline {
        combined.query(&range)
    } else {
        let view = combined.load(&range).await;
        persist(&cache, &combined);
        view
    };

    if view.needs_sign_in {
        eprintln!("{}", "Google Calendar needs a sign-in; showing local and ICS events".yellow());
    } else if let Some(error) = &view.error {
        eprintln!("{} {}", "Some events could not be loaded:".yellow(), error);
    }

    print_events(&view.data, app.tz);
    Ok(())
}

fn persist<G: EventSource, I: EventSource>(cache: &PersistedCache, combined: &CombinedEvents<G, I>) {
    if let Err(e) = combined.google().persist(cache) {
        tracing::warn!("Could not cache Google events: {}", e);
    }
    if let Err(e) = combined.ics().persist(cache) {
        tracing::warn!("Could not cache ICS events: {}", e);
    }
}

fn print_events(events: &[Event], tz: Tz) {
    if events.is_empty() {
        println!("{}", "No events found".dimmed());
        return;
    }

    let today = chrono::Utc::now().with_timezone(&tz).date_naive();
    let mut current_date = None;

    for event in events {
        let date = event.start.with_timezone(&tz).date_naive();
        if current_date != Some(date) {
            if current_date.is_some() {
                println!();
            }
            let label = match (date - today).num_days() {
                0 => "Today".to_string(),
                1 => "Tomorrow".to_string(),
                _ => date.format("%a %b %-d").to_string(),
            };
            println!("{}", label.bold());
            current_date = Some(date);
        }
        println!("  {}", event.render_in(tz));
    }
}
