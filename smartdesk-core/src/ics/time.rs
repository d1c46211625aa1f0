use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{CalendarDateTime, DatePerhapsTime};

/// A DTSTART/DTEND-style value, kept in the form the feed wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IcsTime {
    Date(NaiveDate),
    Utc(DateTime<Utc>),
    Floating(NaiveDateTime),
    Zoned { datetime: NaiveDateTime, tzid: String },
}

impl IcsTime {
    pub fn is_date(&self) -> bool {
        matches!(self, IcsTime::Date(_))
    }

    /// The value's own iCalendar spelling, used to match RECURRENCE-IDs
    /// against generated occurrences.
    pub fn to_ics_string(&self) -> String {
        match self {
            IcsTime::Date(d) => d.format("%Y%m%d").to_string(),
            IcsTime::Utc(dt) => dt.format("%Y%m%dT%H%M%SZ").to_string(),
            IcsTime::Floating(dt) | IcsTime::Zoned { datetime: dt, .. } => {
                dt.format("%Y%m%dT%H%M%S").to_string()
            }
        }
    }

    /// Pin to an instant. Dates and floating times are read in `tz`; an
    /// unknown TZID (Windows names, custom VTIMEZONEs) falls back to `tz` too.
    pub fn resolve(&self, tz: Tz) -> Option<DateTime<Utc>> {
        match self {
            IcsTime::Date(d) => local_midnight(*d, tz),
            IcsTime::Utc(dt) => Some(*dt),
            IcsTime::Floating(dt) => local_to_utc(dt, tz),
            IcsTime::Zoned { datetime, tzid } => {
                local_to_utc(datetime, zone_or(tzid, tz))
            }
        }
    }
}

impl From<DatePerhapsTime> for IcsTime {
    fn from(value: DatePerhapsTime) -> Self {
        match value {
            DatePerhapsTime::Date(d) => IcsTime::Date(d),
            DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => IcsTime::Utc(dt),
            DatePerhapsTime::DateTime(CalendarDateTime::Floating(dt)) => IcsTime::Floating(dt),
            DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
                IcsTime::Zoned {
                    datetime: date_time,
                    tzid,
                }
            }
        }
    }
}

/// The IANA zone named by `tzid`, or `fallback` when it names none.
pub(crate) fn zone_or(tzid: &str, fallback: Tz) -> Tz {
    tzid.parse::<Tz>().unwrap_or_else(|_| {
        tracing::debug!("Unknown TZID {}, reading as {}", tzid, fallback);
        fallback
    })
}

fn local_midnight(date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
    local_to_utc(&date.and_time(NaiveTime::MIN), tz)
}

// Times inside a DST gap shift forward an hour; ambiguous ones take the earlier reading.
fn local_to_utc(dt: &NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(dt)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(*dt + chrono::Duration::hours(1))).earliest())
        .map(|local| local.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_resolve_to_local_midnight() {
        let date = IcsTime::Date(NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
        let resolved = date.resolve(chrono_tz::Europe::Paris).unwrap();
        assert_eq!(resolved, Utc.with_ymd_and_hms(2025, 6, 1, 22, 0, 0).unwrap());
    }

    #[test]
    fn unknown_tzid_falls_back_to_target_zone() {
        let time = IcsTime::Zoned {
            datetime: NaiveDate::from_ymd_opt(2025, 1, 10)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            tzid: "W. Europe Standard Time".into(),
        };
        let resolved = time.resolve(chrono_tz::UTC).unwrap();
        assert_eq!(resolved, Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap());
    }

    #[test]
    fn dst_gap_moves_forward() {
        // 02:30 does not exist in New York on 2025-03-09.
        let time = IcsTime::Floating(
            NaiveDate::from_ymd_opt(2025, 3, 9)
                .unwrap()
                .and_hms_opt(2, 30, 0)
                .unwrap(),
        );
        let resolved = time.resolve(chrono_tz::America::New_York).unwrap();
        assert_eq!(resolved, Utc.with_ymd_and_hms(2025, 3, 9, 7, 30, 0).unwrap());
    }
}
