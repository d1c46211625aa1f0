//! From feed text to [`Event`]s for one window.

use std::collections::{HashMap, HashSet};

use chrono_tz::Tz;
use smartdesk_core::event_cache::is_event_overlapping_range;
use smartdesk_core::ics::{IcsEvent, IcsTime, expand_recurring_event, parse_calendar};
use smartdesk_core::{CalendarRef, DateRange, Event, EventOrigin, SmartDeskResult};

/// Parse a feed, expand its recurring events over `window`, and keep what
/// overlaps it.
pub fn normalize_feed(
    content: &str,
    calendar: &CalendarRef,
    window: &DateRange,
    tz: Tz,
) -> SmartDeskResult<Vec<Event>> {
    let parsed = parse_calendar(content)?;

    let mut masters = Vec::new();
    let mut overrides: HashMap<String, HashMap<String, IcsEvent>> = HashMap::new();
    let mut singles = Vec::new();
    for event in parsed {
        if event.is_recurring_master() {
            masters.push(event);
        } else if let Some(recurrence_id) = &event.recurrence_id {
            overrides
                .entry(event.uid.clone())
                .or_default()
                .insert(recurrence_id.to_ics_string(), event);
        } else {
            singles.push(event);
        }
    }

    let empty = HashMap::new();
    let mut occurrences = Vec::new();
    for master in &masters {
        let own_overrides = overrides.get(&master.uid).unwrap_or(&empty);
        match expand_recurring_event(master, window, own_overrides, tz) {
            Ok(instances) => occurrences.extend(instances),
            Err(e) => {
                tracing::warn!(calendar = %calendar.name, "{}; showing the first occurrence only", e);
                occurrences.push(master.clone());
            }
        }
        // Overrides moved into the window from an occurrence outside it.
        occurrences.extend(own_overrides.values().filter(|o| !o.cancelled).cloned());
    }

    // Overrides whose master is not in the feed stand on their own.
    let master_uids: HashSet<&str> = masters.iter().map(|m| m.uid.as_str()).collect();
    for (uid, by_id) in overrides.iter() {
        if !master_uids.contains(uid.as_str()) {
            occurrences.extend(by_id.values().cloned());
        }
    }
    occurrences.extend(singles);

    let mut seen = HashSet::new();
    let events = occurrences
        .iter()
        .filter_map(|o| to_event(o, calendar, tz))
        .filter(|e| is_event_overlapping_range(e, window))
        .filter(|e| seen.insert(e.id.clone()))
        .collect();

    Ok(events)
}

/// Occurrence ids are `<uid>` for one-off events and
/// `<uid>_<recurrence-id>` for instances of a series.
pub fn occurrence_id(event: &IcsEvent) -> String {
    match &event.recurrence_id {
        Some(recurrence_id) => format!("{}_{}", event.uid, recurrence_id.to_ics_string()),
        None => event.uid.clone(),
    }
}

fn to_event(event: &IcsEvent, calendar: &CalendarRef, tz: Tz) -> Option<Event> {
    if event.cancelled {
        return None;
    }

    let start = event.start.resolve(tz)?;
    let end = match (&event.end, event.duration, &event.start) {
        (Some(end), _, _) => end.resolve(tz)?,
        (None, Some(duration), _) => start + duration,
        // A lone DATE start covers that whole day.
        (None, None, IcsTime::Date(day)) => IcsTime::Date(day.succ_opt()?).resolve(tz)?,
        (None, None, _) => start,
    };

    let mut converted =
        Event::new(occurrence_id(event), event.summary.clone(), start, end).with_source(EventOrigin::Ics);
    converted.all_day = event.start.is_date();
    converted.description = event.description.clone().filter(|d| !d.is_empty());
    converted.location = event.location.clone().filter(|l| !l.is_empty());
    converted.attendee_count = (event.attendee_count > 0).then_some(event.attendee_count);
    converted.calendar = Some(calendar.clone());
    converted.updated_at = event.last_modified;

    if !converted.is_well_formed() {
        tracing::debug!("Dropping ICS event {} ending before it starts", converted.id);
        return None;
    }
    Some(converted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn calendar() -> CalendarRef {
        CalendarRef {
            id: "feed-1".into(),
            name: "Holidays".into(),
            color: Some("#33aa55".into()),
        }
    }

    fn january() -> DateRange {
        DateRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        )
    }

    fn feed(body: &str) -> String {
        format!("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\n{body}END:VCALENDAR\r\n")
    }

    #[test]
    fn all_day_event_spans_the_local_day() {
        let content = feed(
            "BEGIN:VEVENT\r\nUID:ny\r\nSUMMARY:New Year\r\nDTSTART;VALUE=DATE:20240101\r\n\
             END:VEVENT\r\n",
        );

        let events =
            normalize_feed(&content, &calendar(), &january(), chrono_tz::Europe::Paris).unwrap();

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert!(event.all_day);
        assert_eq!(event.start, Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap());
        assert_eq!(event.end, Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap());
        assert_eq!(event.source, Some(EventOrigin::Ics));
        assert_eq!(event.calendar, Some(calendar()));
    }

    #[test]
    fn recurring_series_yields_instance_ids_and_overrides() {
        let content = feed(
            "BEGIN:VEVENT\r\nUID:sync\r\nSUMMARY:Sync\r\nDTSTART:20240101T100000Z\r\n\
             DTEND:20240101T110000Z\r\nRRULE:FREQ=WEEKLY;COUNT=3\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:sync\r\nSUMMARY:Sync (moved)\r\nRECURRENCE-ID:20240108T100000Z\r\n\
             DTSTART:20240108T140000Z\r\nDTEND:20240108T150000Z\r\nEND:VEVENT\r\n",
        );

        let events = normalize_feed(&content, &calendar(), &january(), chrono_tz::UTC).unwrap();
        let mut ids: Vec<(&str, &str)> =
            events.iter().map(|e| (e.id.as_str(), e.title.as_str())).collect();
        ids.sort();

        assert_eq!(
            ids,
            vec![
                ("sync_20240101T100000Z", "Sync"),
                ("sync_20240108T100000Z", "Sync (moved)"),
                ("sync_20240115T100000Z", "Sync"),
            ]
        );
    }

    #[test]
    fn duration_and_window_are_applied() {
        let content = feed(
            "BEGIN:VEVENT\r\nUID:talk\r\nSUMMARY:Talk\r\nDTSTART:20240110T090000Z\r\n\
             DURATION:PT45M\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:later\r\nSUMMARY:Later\r\nDTSTART:20240310T090000Z\r\n\
             DTEND:20240310T100000Z\r\nEND:VEVENT\r\n",
        );

        let events = normalize_feed(&content, &calendar(), &january(), chrono_tz::UTC).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "talk");
        assert_eq!(events[0].end - events[0].start, Duration::minutes(45));
    }

    #[test]
    fn orphan_override_is_kept() {
        let content = feed(
            "BEGIN:VEVENT\r\nUID:lonely\r\nSUMMARY:Moved\r\nRECURRENCE-ID:20240105T100000Z\r\n\
             DTSTART:20240106T100000Z\r\nDTEND:20240106T110000Z\r\nEND:VEVENT\r\n",
        );

        let events = normalize_feed(&content, &calendar(), &january(), chrono_tz::UTC).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "lonely_20240105T100000Z");
    }

    #[test]
    fn cancelled_and_backwards_events_are_dropped() {
        let content = feed(
            "BEGIN:VEVENT\r\nUID:gone\r\nSUMMARY:Gone\r\nSTATUS:CANCELLED\r\n\
             DTSTART:20240110T090000Z\r\nDTEND:20240110T100000Z\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:bad\r\nSUMMARY:Bad\r\nDTSTART:20240110T100000Z\r\n\
             DTEND:20240110T090000Z\r\nEND:VEVENT\r\n",
        );

        let events = normalize_feed(&content, &calendar(), &january(), chrono_tz::UTC).unwrap();
        assert!(events.is_empty());
    }
}
