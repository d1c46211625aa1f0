//! Feed parsing on top of the icalendar crate's parser.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use icalendar::DatePerhapsTime;
use icalendar::parser::{Component, Property, read_calendar, unfold};

use super::time::IcsTime;
use crate::error::{SmartDeskError, SmartDeskResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recurrence {
    pub rrule: String,
    pub exdates: Vec<IcsTime>,
}

/// One VEVENT as written in the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct IcsEvent {
    pub uid: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: IcsTime,
    pub end: Option<IcsTime>,
    pub duration: Option<chrono::Duration>,
    pub cancelled: bool,
    pub recurrence: Option<Recurrence>,
    pub recurrence_id: Option<IcsTime>,
    pub last_modified: Option<DateTime<Utc>>,
    pub attendee_count: u32,
}

impl IcsEvent {
    pub fn is_recurring_master(&self) -> bool {
        self.recurrence.is_some() && self.recurrence_id.is_none()
    }
}

/// Parse every VEVENT in a feed. Events without UID or DTSTART are skipped.
pub fn parse_calendar(content: &str) -> SmartDeskResult<Vec<IcsEvent>> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| SmartDeskError::IcsParse(e.to_string()))?;

    let events = calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .filter_map(|vevent| {
            let parsed = parse_vevent(vevent);
            if parsed.is_none() {
                tracing::debug!("Skipping VEVENT without UID or DTSTART");
            }
            parsed
        })
        .collect();

    Ok(events)
}

fn parse_vevent(vevent: &Component) -> Option<IcsEvent> {
    let uid = vevent.find_prop("UID")?.val.to_string();
    let start = IcsTime::from(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?);
    let end = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(IcsTime::from);
    let duration = vevent
        .find_prop("DURATION")
        .and_then(|p| parse_duration(p.val.as_ref()));

    let summary = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| "(No title)".to_string());
    let description = vevent.find_prop("DESCRIPTION").map(|p| p.val.to_string());
    let location = vevent.find_prop("LOCATION").map(|p| p.val.to_string());
    let cancelled = vevent
        .find_prop("STATUS")
        .is_some_and(|p| p.val.as_ref().eq_ignore_ascii_case("CANCELLED"));

    let exdates: Vec<IcsTime> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(parse_exdate_property)
        .collect();
    let recurrence = vevent
        .find_prop("RRULE")
        .map(|p| Recurrence {
            rrule: p.val.to_string(),
            exdates,
        });

    let recurrence_id = vevent
        .find_prop("RECURRENCE-ID")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(IcsTime::from);

    let last_modified = vevent
        .find_prop("LAST-MODIFIED")
        .or_else(|| vevent.find_prop("DTSTAMP"))
        .and_then(|p| parse_utc_stamp(p.val.as_ref()));

    let attendee_count = vevent
        .properties
        .iter()
        .filter(|p| p.name == "ATTENDEE")
        .count() as u32;

    Some(IcsEvent {
        uid,
        summary,
        description,
        location,
        start,
        end,
        duration,
        cancelled,
        recurrence,
        recurrence_id,
        last_modified,
        attendee_count,
    })
}

/// `PT1H30M`, `P1D`, `-PT15M`
fn parse_duration(value: &str) -> Option<chrono::Duration> {
    let negative = value.starts_with('-');
    let body = value.trim_start_matches(['-', '+']);
    let parsed: std::time::Duration = iso8601::duration(body).ok()?.into();
    let duration = chrono::Duration::from_std(parsed).ok()?;
    Some(if negative { -duration } else { duration })
}

fn parse_utc_stamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim_end_matches('Z'), "%Y%m%dT%H%M%S")
        .ok()
        .map(|dt| dt.and_utc())
}

/// EXDATE values: TZID-qualified, VALUE=DATE, UTC or floating, possibly
/// comma-separated.
fn parse_exdate_property(prop: &Property) -> Vec<IcsTime> {
    let tzid = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()));

    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            if is_date {
                return NaiveDate::parse_from_str(s, "%Y%m%d").ok().map(IcsTime::Date);
            }
            if let Some(stripped) = s.strip_suffix('Z') {
                return NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| IcsTime::Utc(dt.and_utc()));
            }
            let datetime = NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S").ok()?;
            Some(match &tzid {
                Some(tz) => IcsTime::Zoned {
                    datetime,
                    tzid: tz.clone(),
                },
                None => IcsTime::Floating(datetime),
            })
        })
        .collect()
}
