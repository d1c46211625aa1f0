//! Colored terminal rendering for Smart Desk types.

use chrono_tz::Tz;
use owo_colors::OwoColorize;
use smartdesk_core::store::SyncDirection;
use smartdesk_core::{Event, EventOrigin, SyncReport};

pub trait Render {
    fn render(&self) -> String;
}

impl Render for SyncReport {
    fn render(&self) -> String {
        let arrow = match self.direction {
            SyncDirection::Push => "↑",
            SyncDirection::Pull => "↓",
        };
        let head = format!("{} {}", arrow, self.table);

        if self.skipped {
            return format!("{} {}", head.dimmed(), "(already syncing)".dimmed());
        }
        if let Some(error) = &self.error {
            return format!("{} {}", head.red(), error.red());
        }

        let mut lines = vec![match self.direction {
            SyncDirection::Push => {
                let pushed = self.succeeded().count();
                format!("{} {}", head.green(), format!("{} pushed", pushed).dimmed())
            }
            SyncDirection::Pull => format!(
                "{} {}",
                head.green(),
                format!("{} pulled, {} kept local", self.pulled, self.kept_local).dimmed()
            ),
        }];
        for failure in self.failures() {
            lines.push(format!(
                "   {} {}: {}",
                "✗".red(),
                failure.id,
                failure.error.as_deref().unwrap_or("unknown error")
            ));
        }
        lines.join("\n")
    }
}

/// Event lines need the display zone.
pub trait RenderInZone {
    fn render_in(&self, tz: Tz) -> String;
}

impl RenderInZone for Event {
    fn render_in(&self, tz: Tz) -> String {
        let time = if self.all_day {
            format!("{:>7}", "all-day")
        } else {
            format!("{:>7}", self.start.with_timezone(&tz).format("%H:%M"))
        };

        let tag = match self.origin() {
            EventOrigin::Local => "local".blue().to_string(),
            EventOrigin::Google => "google".green().to_string(),
            EventOrigin::Ics => "ics".magenta().to_string(),
        };
        let calendar = self
            .calendar
            .as_ref()
            .map(|c| format!(" [{}]", c.name).dimmed().to_string())
            .unwrap_or_default();

        format!("{} {}{} {}", time, self.title, calendar, tag)
    }
}
