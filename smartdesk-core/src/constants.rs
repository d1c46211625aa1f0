//! Shared defaults.

/// Days of slack kept on each side of a visible window when caching events.
pub const DEFAULT_BUFFER_DAYS: i64 = 60;

/// Days before/after today covered when no explicit window is given.
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Per-request timeout for Google calendar-events calls.
pub const GOOGLE_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Page size requested from the Google events endpoint.
pub const GOOGLE_MAX_RESULTS: u32 = 250;

pub const DEFAULT_CACHE_KEY_PREFIX: &str = "smartdesk-cache-";
pub const DEFAULT_CACHE_MAX_AGE_HOURS: u64 = 24;
