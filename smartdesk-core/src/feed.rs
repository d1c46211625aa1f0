//! Per-source event caches.
//!
//! An [`EventFeed`] wraps one [`EventSource`] the way a query cache wraps a
//! fetcher: it fetches a buffered window around what is being looked at,
//! unions successive fetches by source-qualified id, evicts what falls out of
//! the buffer, and answers range queries from memory until the data goes
//! stale or the requested window leaves the fetched one.

use std::future::Future;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::date_range::DateRange;
use crate::error::SmartDeskResult;
use crate::event::{Event, EventOrigin};
use crate::event_cache::{
    BufferDays, expand_range_with_buffer, filter_events_by_range, merge_events_by_id,
    prune_by_range_with_buffer,
};
use crate::query_cache::PersistedCache;
use crate::retry::RetryPolicy;

/// Something that can list events for a window: a calendar provider.
pub trait EventSource: Send + Sync {
    fn origin(&self) -> EventOrigin;

    fn events_in_range(
        &self,
        range: &DateRange,
    ) -> impl Future<Output = SmartDeskResult<Vec<Event>>> + Send;
}

#[derive(Debug, Clone, Copy)]
pub struct FeedOptions {
    pub buffer: BufferDays,
    /// Cached data older than this is refetched on the next `ensure`.
    pub refetch_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for FeedOptions {
    fn default() -> Self {
        FeedOptions {
            buffer: BufferDays::default(),
            refetch_interval: Duration::from_secs(5 * 60),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStatus {
    pub has_data: bool,
    pub is_fetching: bool,
    pub error: Option<String>,
    /// The last failure means the user must sign in again.
    pub needs_sign_in: bool,
}

impl FeedStatus {
    pub fn is_loading(&self) -> bool {
        self.is_fetching && !self.has_data
    }
}

#[derive(Default)]
struct FeedCache {
    events: Vec<Event>,
    window: Option<DateRange>,
    fetched_at: Option<Instant>,
    error: Option<String>,
    needs_sign_in: bool,
}

#[derive(Serialize, Deserialize)]
struct PersistedFeed {
    window: DateRange,
    events: Vec<Event>,
}

pub struct EventFeed<S: EventSource> {
    source: S,
    options: FeedOptions,
    cache: RwLock<FeedCache>,
    fetching: AtomicBool,
    fetch_lock: Mutex<()>,
}

impl<S: EventSource> EventFeed<S> {
    pub fn new(source: S, options: FeedOptions) -> Self {
        EventFeed {
            source,
            options,
            cache: RwLock::new(FeedCache::default()),
            fetching: AtomicBool::new(false),
            fetch_lock: Mutex::new(()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn origin(&self) -> EventOrigin {
        self.source.origin()
    }

    /// Cached events overlapping `range`. Never fetches.
    pub fn range_view(&self, range: &DateRange) -> Vec<Event> {
        filter_events_by_range(&self.read().events, range)
    }

    pub fn status(&self) -> FeedStatus {
        let cache = self.read();
        FeedStatus {
            has_data: cache.window.is_some(),
            is_fetching: self.fetching.load(Ordering::SeqCst),
            error: cache.error.clone(),
            needs_sign_in: cache.needs_sign_in,
        }
    }

    pub fn needs_fetch(&self, range: &DateRange) -> bool {
        let cache = self.read();
        let covered = cache.window.is_some_and(|w| w.covers(range));
        let fresh = cache
            .fetched_at
            .is_some_and(|at| at.elapsed() < self.options.refetch_interval);
        !(covered && fresh)
    }

    /// Serve `range` from cache, fetching first when needed.
    pub async fn ensure(&self, range: &DateRange) -> SmartDeskResult<Vec<Event>> {
        if self.needs_fetch(range) {
            self.refetch(range).await?;
        }
        Ok(self.range_view(range))
    }

    /// Fetch the buffered window around `range` and merge it into the cache.
    pub async fn refetch(&self, range: &DateRange) -> SmartDeskResult<()> {
        let _guard = self.fetch_lock.lock().await;
        let window = expand_range_with_buffer(range, self.options.buffer);
        let origin = self.source.origin();

        self.fetching.store(true, Ordering::SeqCst);
        let result = self
            .options
            .retry
            .run(|| self.source.events_in_range(&window))
            .await;
        self.fetching.store(false, Ordering::SeqCst);

        let mut cache = self.write();
        match result {
            Ok(mut incoming) => {
                for event in &mut incoming {
                    event.source.get_or_insert(origin);
                }
                let merged = merge_events_by_id(&cache.events, &incoming, origin);
                cache.events = prune_by_range_with_buffer(&merged, range, self.options.buffer);
                cache.window = Some(window);
                cache.fetched_at = Some(Instant::now());
                cache.error = None;
                cache.needs_sign_in = false;
                tracing::debug!("{} feed holds {} events", origin, cache.events.len());
                Ok(())
            }
            Err(e) => {
                tracing::warn!("{} fetch failed: {}", origin, e);
                cache.error = Some(e.to_string());
                cache.needs_sign_in = e.is_auth_error();
                Err(e)
            }
        }
    }

    /// Seed the cache from disk. The seeded data counts as stale, so the next
    /// `ensure` still refetches; callers just get something to show meanwhile.
    pub fn warm_start(&self, store: &PersistedCache) -> bool {
        let Some(persisted) = store.load::<PersistedFeed>(self.cache_key()) else {
            return false;
        };
        let mut cache = self.write();
        if cache.window.is_some() {
            return false;
        }
        cache.events = persisted.events;
        cache.window = Some(persisted.window);
        cache.fetched_at = None;
        true
    }

    pub fn persist(&self, store: &PersistedCache) -> SmartDeskResult<()> {
        let cache = self.read();
        let Some(window) = cache.window else {
            return Ok(());
        };
        store.save(
            self.cache_key(),
            &PersistedFeed {
                window,
                events: cache.events.clone(),
            },
        )
    }

    fn cache_key(&self) -> &'static str {
        match self.source.origin() {
            EventOrigin::Google => "events-google",
            EventOrigin::Ics => "events-ics",
            EventOrigin::Local => "events-local",
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, FeedCache> {
        self.cache.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, FeedCache> {
        self.cache.write().unwrap_or_else(|e| e.into_inner())
    }
}
