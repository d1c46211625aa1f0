//! iCalendar feed parsing and recurrence expansion.

mod parse;
mod recurrence;
mod time;

pub use parse::{IcsEvent, Recurrence, parse_calendar};
pub use recurrence::expand_recurring_event;
pub use time::IcsTime;
