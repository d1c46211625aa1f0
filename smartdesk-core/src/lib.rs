//! Core of Smart Desk: records and their sync against a REST backend, cached
//! calendar feeds from Google and ICS sources, the combined event view, and
//! the route-aware sync scheduler.

pub mod adapter;
pub mod aggregator;
pub mod backend;
pub mod config;
pub mod constants;
pub mod date_range;
pub mod entity;
pub mod error;
pub mod event;
pub mod event_cache;
pub mod feed;
pub mod ics;
pub mod query_cache;
pub mod retry;
pub mod store;
pub mod sync;

pub use aggregator::{CombinedEvents, CombinedEventsView, combine_events};
pub use config::SmartDeskConfig;
pub use date_range::DateRange;
pub use error::{ProviderErrorKind, SmartDeskError, SmartDeskResult};
pub use event::{CalendarRef, Event, EventOrigin};
pub use feed::{EventFeed, EventSource, FeedOptions};
pub use store::{EntityStore, SyncReport, SyncedEntityStore};
