//! Outcomes of sync operations.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    Push,
    Pull,
}

/// Result for a single record pushed to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub id: String,
    pub error: Option<String>,
}

impl ItemOutcome {
    pub fn ok(id: impl Into<String>) -> Self {
        ItemOutcome {
            id: id.into(),
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        ItemOutcome {
            id: id.into(),
            error: Some(reason.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// What one `sync_pending`/`sync_from_server`/`flush_queue` call did.
///
/// Partial failures are recorded here instead of being returned as errors:
/// one failing record never hides the others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub table: &'static str,
    pub direction: SyncDirection,
    pub outcomes: Vec<ItemOutcome>,
    /// Server rows applied locally.
    pub pulled: usize,
    /// Server rows rejected because the unsynced local copy was newer.
    pub kept_local: usize,
    /// Another sync on the same store was still running.
    pub skipped: bool,
    /// The operation as a whole failed (e.g. the fetch itself).
    pub error: Option<String>,
}

impl SyncReport {
    pub fn new(table: &'static str, direction: SyncDirection) -> Self {
        SyncReport {
            table,
            direction,
            outcomes: Vec::new(),
            pulled: 0,
            kept_local: 0,
            skipped: false,
            error: None,
        }
    }

    pub fn skipped(table: &'static str, direction: SyncDirection) -> Self {
        SyncReport {
            skipped: true,
            ..SyncReport::new(table, direction)
        }
    }

    pub fn failed(table: &'static str, direction: SyncDirection, error: impl Into<String>) -> Self {
        SyncReport {
            error: Some(error.into()),
            ..SyncReport::new(table, direction)
        }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| o.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    /// The operation-level error if any, else the first per-record failure.
    pub fn first_error(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.failures().find_map(|o| o.error.as_deref()))
    }

    pub fn is_clean(&self) -> bool {
        self.first_error().is_none()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.skipped {
            return write!(f, "{}: skipped (sync already running)", self.table);
        }
        if let Some(error) = &self.error {
            return write!(f, "{}: {}", self.table, error);
        }
        match self.direction {
            SyncDirection::Push => write!(
                f,
                "{}: pushed {}, failed {}",
                self.table,
                self.succeeded().count(),
                self.failures().count()
            ),
            SyncDirection::Pull => write!(
                f,
                "{}: pulled {}, kept {} local",
                self.table, self.pulled, self.kept_local
            ),
        }
    }
}
