//! RRULE expansion for recurring feed events.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;

use super::parse::{IcsEvent, Recurrence};
use super::time::{IcsTime, zone_or};
use crate::date_range::DateRange;
use crate::error::{SmartDeskError, SmartDeskResult};

const MAX_OCCURRENCES: u16 = 1000;

fn rrule_time(prefix: &str, time: &IcsTime, tz: Tz) -> String {
    // The rrule crate needs a datetime, so dates become midnight UTC and
    // floating times are read as UTC. Zones it cannot name are read as `tz`.
    match time {
        IcsTime::Date(d) => format!("{prefix}:{}T000000Z", d.format("%Y%m%d")),
        IcsTime::Utc(dt) => format!("{prefix}:{}", dt.format("%Y%m%dT%H%M%SZ")),
        IcsTime::Floating(dt) => format!("{prefix}:{}Z", dt.format("%Y%m%dT%H%M%S")),
        IcsTime::Zoned { datetime, tzid } => {
            let zone = zone_or(tzid, tz);
            format!("{prefix};TZID={}:{}", zone.name(), datetime.format("%Y%m%dT%H%M%S"))
        }
    }
}

fn build_rrule_set(start: &IcsTime, recurrence: &Recurrence, tz: Tz) -> String {
    let mut lines = vec![
        rrule_time("DTSTART", start, tz),
        format!("RRULE:{}", recurrence.rrule),
    ];
    lines.extend(recurrence.exdates.iter().map(|ex| rrule_time("EXDATE", ex, tz)));
    lines.join("\n")
}

fn occurrence_time(dt: &DateTime<rrule::Tz>, master_start: &IcsTime) -> IcsTime {
    match master_start {
        IcsTime::Date(_) => IcsTime::Date(dt.date_naive()),
        IcsTime::Utc(_) => IcsTime::Utc(dt.with_timezone(&Utc)),
        IcsTime::Floating(_) => IcsTime::Floating(dt.naive_utc()),
        IcsTime::Zoned { tzid, .. } => IcsTime::Zoned {
            datetime: dt.naive_local(),
            tzid: tzid.clone(),
        },
    }
}

/// Length of one occurrence, taken from the master's DTEND or DURATION.
fn master_length(master: &IcsEvent, tz: Tz) -> Duration {
    if let Some(duration) = master.duration {
        return duration;
    }
    let resolved = master
        .end
        .as_ref()
        .and_then(|end| Some((master.start.resolve(tz)?, end.resolve(tz)?)));
    match resolved {
        Some((start, end)) => end - start,
        None if master.start.is_date() => Duration::days(1),
        None => Duration::zero(),
    }
}

fn shift(time: &IcsTime, by: Duration) -> IcsTime {
    match time {
        IcsTime::Date(d) => IcsTime::Date(*d + Duration::days(by.num_days())),
        IcsTime::Utc(dt) => IcsTime::Utc(*dt + by),
        IcsTime::Floating(dt) => IcsTime::Floating(*dt + by),
        IcsTime::Zoned { datetime, tzid } => IcsTime::Zoned {
            datetime: *datetime + by,
            tzid: tzid.clone(),
        },
    }
}

/// Expand a recurring master into its instances around `window`. Instances
/// ending just before the window may be included; callers filter by overlap
/// once times are resolved.
///
/// `overrides` maps RECURRENCE-ID strings (see [`IcsTime::to_ics_string`]) to
/// the override VEVENTs for this UID; a matching override replaces the
/// generated instance, and a cancelled one removes it. The master itself is
/// never part of the output.
pub fn expand_recurring_event(
    master: &IcsEvent,
    window: &DateRange,
    overrides: &HashMap<String, IcsEvent>,
    tz: Tz,
) -> SmartDeskResult<Vec<IcsEvent>> {
    let Some(recurrence) = &master.recurrence else {
        return Ok(Vec::new());
    };

    let rrule_set: RRuleSet = build_rrule_set(&master.start, recurrence, tz)
        .parse()
        .map_err(|e| {
            SmartDeskError::IcsParse(format!(
                "Failed to parse RRULE for event '{}': {}",
                master.uid, e
            ))
        })?;

    let length = master_length(master, tz);

    // Occurrences that start before the window but run into it count too.
    // `after`/`before` are exclusive, hence the extra second.
    let utc: rrule::Tz = Utc.into();
    let lookback = length.max(Duration::days(1)) + Duration::seconds(1);
    let after = (window.start - lookback).with_timezone(&utc);
    let before = window.end.with_timezone(&utc);

    let result = rrule_set.after(after).before(before).all(MAX_OCCURRENCES);
    if result.limited {
        tracing::warn!(
            "Recurring event '{}' has more than {} occurrences in range, truncating",
            master.uid,
            MAX_OCCURRENCES
        );
    }

    let mut instances = Vec::new();
    for occurrence in &result.dates {
        let start = occurrence_time(occurrence, &master.start);

        if let Some(replacement) = overrides.get(&start.to_ics_string()) {
            if !replacement.cancelled {
                instances.push(replacement.clone());
            }
            continue;
        }

        let end = shift(&start, length);
        instances.push(IcsEvent {
            start: start.clone(),
            end: Some(end),
            duration: None,
            recurrence: None,
            recurrence_id: Some(start),
            ..master.clone()
        });
    }

    Ok(instances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ics::parse_calendar;
    use chrono::TimeZone;

    fn january() -> DateRange {
        DateRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        )
    }

    fn parse(body: &str) -> Vec<IcsEvent> {
        parse_calendar(&format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\n{body}END:VCALENDAR\r\n"
        ))
        .unwrap()
    }

    #[test]
    fn weekly_rule_respects_exdates() {
        let events = parse(
            "BEGIN:VEVENT\r\nUID:standup\r\nSUMMARY:Standup\r\nDTSTART:20240101T100000Z\r\n\
             DTEND:20240101T103000Z\r\nRRULE:FREQ=WEEKLY;BYDAY=MO\r\nEXDATE:20240108T100000Z\r\nEND:VEVENT\r\n",
        );

        let instances =
            expand_recurring_event(&events[0], &january(), &HashMap::new(), chrono_tz::UTC).unwrap();

        // Mondays in January 2024: 1, 8, 15, 22, 29; the 8th is excluded.
        let days: Vec<String> = instances.iter().map(|i| i.start.to_ics_string()).collect();
        assert_eq!(
            days,
            vec!["20240101T100000Z", "20240115T100000Z", "20240122T100000Z", "20240129T100000Z"]
        );
        assert_eq!(
            instances[0].end,
            Some(IcsTime::Utc(Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap()))
        );
        assert!(instances.iter().all(|i| i.recurrence.is_none() && i.recurrence_id.is_some()));
    }

    #[test]
    fn overrides_replace_or_cancel_instances() {
        let events = parse(
            "BEGIN:VEVENT\r\nUID:sync\r\nSUMMARY:Sync\r\nDTSTART:20240101T100000Z\r\n\
             DTEND:20240101T110000Z\r\nRRULE:FREQ=WEEKLY;COUNT=3\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:sync\r\nSUMMARY:Sync (moved)\r\nRECURRENCE-ID:20240108T100000Z\r\n\
             DTSTART:20240108T140000Z\r\nDTEND:20240108T150000Z\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:sync\r\nRECURRENCE-ID:20240115T100000Z\r\nSTATUS:CANCELLED\r\n\
             DTSTART:20240115T100000Z\r\nEND:VEVENT\r\n",
        );
        let overrides: HashMap<String, IcsEvent> = events[1..]
            .iter()
            .map(|e| (e.recurrence_id.as_ref().unwrap().to_ics_string(), e.clone()))
            .collect();

        let instances =
            expand_recurring_event(&events[0], &january(), &overrides, chrono_tz::UTC).unwrap();

        let titles: Vec<&str> = instances.iter().map(|i| i.summary.as_str()).collect();
        assert_eq!(titles, vec!["Sync", "Sync (moved)"]);
    }

    #[test]
    fn windows_tzid_series_expands_in_fallback_zone() {
        let events = parse(
            "BEGIN:VEVENT\r\nUID:focus\r\nSUMMARY:Focus\r\n\
             DTSTART;TZID=W. Europe Standard Time:20240108T090000\r\n\
             DTEND;TZID=W. Europe Standard Time:20240108T100000\r\n\
             RRULE:FREQ=DAILY;COUNT=3\r\nEND:VEVENT\r\n",
        );

        let instances =
            expand_recurring_event(&events[0], &january(), &HashMap::new(), chrono_tz::UTC).unwrap();

        assert_eq!(instances.len(), 3);
        let starts: Vec<_> = instances
            .iter()
            .map(|i| i.start.resolve(chrono_tz::UTC).unwrap())
            .collect();
        assert_eq!(
            starts,
            vec![
                Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 9, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap(),
            ]
        );
        assert!(matches!(
            &instances[0].start,
            IcsTime::Zoned { tzid, .. } if tzid == "W. Europe Standard Time"
        ));
    }

    #[test]
    fn all_day_series_keep_their_length() {
        let events = parse(
            "BEGIN:VEVENT\r\nUID:trip\r\nDTSTART;VALUE=DATE:20240105\r\nDTEND;VALUE=DATE:20240107\r\n\
             RRULE:FREQ=WEEKLY;COUNT=2\r\nEND:VEVENT\r\n",
        );

        let instances =
            expand_recurring_event(&events[0], &january(), &HashMap::new(), chrono_tz::UTC).unwrap();

        assert_eq!(instances.len(), 2);
        assert_eq!(
            instances[1].end.as_ref().map(IcsTime::to_ics_string).as_deref(),
            Some("20240114")
        );
    }

    #[test]
    fn occurrence_running_into_window_is_included() {
        let events = parse(
            "BEGIN:VEVENT\r\nUID:night\r\nDTSTART:20231231T220000Z\r\nDTEND:20240101T020000Z\r\n\
             RRULE:FREQ=DAILY;COUNT=1\r\nEND:VEVENT\r\n",
        );

        let instances =
            expand_recurring_event(&events[0], &january(), &HashMap::new(), chrono_tz::UTC).unwrap();

        assert_eq!(instances.len(), 1);
    }
}
