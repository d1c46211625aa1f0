//! Pure helpers for merging, de-duplicating and range-filtering cached events.

use std::collections::HashMap;

use crate::constants::DEFAULT_BUFFER_DAYS;
use crate::date_range::DateRange;
use crate::event::{Event, EventOrigin};

/// Days added around a visible window before caching or evicting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDays {
    pub before: i64,
    pub after: i64,
}

impl Default for BufferDays {
    fn default() -> Self {
        BufferDays {
            before: DEFAULT_BUFFER_DAYS,
            after: DEFAULT_BUFFER_DAYS,
        }
    }
}

/// Cache key qualified by origin, e.g. `google:abc123`.
///
/// Providers reuse opaque or numeric ids independently, so the raw id alone
/// is not unique across sources.
pub fn cache_identity(event: &Event, source: EventOrigin) -> String {
    format!("{}:{}", source, event.id)
}

/// Keep whichever event carries the later `updated_at`.
///
/// An event without a timestamp counts as oldest. On a tie the incoming
/// event wins, so re-merging the same batch changes nothing.
pub fn pick_newest(existing: Event, incoming: Event) -> Event {
    match (existing.updated_at, incoming.updated_at) {
        (Some(current), Some(next)) if current > next => existing,
        (Some(_), None) => existing,
        _ => incoming,
    }
}

/// Merge `incoming` into `previous`, one event per source-qualified id.
///
/// Order is stable: previously cached events keep their position and new
/// ones are appended in the order they arrived.
pub fn merge_events_by_id(previous: &[Event], incoming: &[Event], source: EventOrigin) -> Vec<Event> {
    let mut merged: Vec<Event> = Vec::with_capacity(previous.len() + incoming.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for event in previous.iter().chain(incoming) {
        let key = cache_identity(event, source);
        match index.get(&key) {
            Some(&slot) => {
                let existing = merged[slot].clone();
                merged[slot] = pick_newest(existing, event.clone());
            }
            None => {
                index.insert(key, merged.len());
                merged.push(event.clone());
            }
        }
    }

    merged
}

/// Half-open overlap: `start < range.end && end > range.start`.
///
/// Events touching a boundary are outside the range. Malformed events never match.
pub fn is_event_overlapping_range(event: &Event, range: &DateRange) -> bool {
    event.is_well_formed() && event.start < range.end && event.end > range.start
}

pub fn filter_events_by_range(events: &[Event], range: &DateRange) -> Vec<Event> {
    events
        .iter()
        .filter(|e| is_event_overlapping_range(e, range))
        .cloned()
        .collect()
}

pub fn expand_range_with_buffer(range: &DateRange, buffer: BufferDays) -> DateRange {
    range.expand(buffer.before, buffer.after)
}

/// Evict everything outside the buffered window around `range`.
pub fn prune_by_range_with_buffer(events: &[Event], range: &DateRange, buffer: BufferDays) -> Vec<Event> {
    filter_events_by_range(events, &expand_range_with_buffer(range, buffer))
}
